//! `get_weather`: canned report used by the standalone weather agent.

use super::{required_str, result_schema, Tool};
use crate::error::ErrorKind;
use crate::types::{ToolPayload, ToolResult, WeatherReport};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Value};

/// Central Africa Time, UTC+2, no daylight saving.
const CAT_OFFSET_SECS: i32 = 2 * 3600;

#[derive(Debug, Default)]
pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        Self
    }

    /// Report for `city` at `now`, or the message to show when there is none.
    pub fn report_for(city: &str, now: DateTime<Utc>) -> Result<WeatherReport, String> {
        if !city.trim().eq_ignore_ascii_case("lusaka") {
            return Err(format!("No weather data for {}.", city));
        }

        let Some(cat) = FixedOffset::east_opt(CAT_OFFSET_SECS) else {
            return Err(format!("No weather data for {}.", city));
        };
        let local = now.with_timezone(&cat);
        Ok(WeatherReport {
            city: city.to_string(),
            report: format!(
                "Sunny, 20°C in {} at {}",
                city,
                local.format("%Y-%m-%d %H:%M:%S CAT")
            ),
        })
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather report for a city."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City name"}
            },
            "required": ["city"]
        })
    }

    fn output_schema(&self) -> Value {
        result_schema(json!({
            "city": {"type": "string"},
            "report": {"type": "string"}
        }))
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let city = match required_str(args, "city") {
            Ok(city) => city,
            Err(e) => return ToolResult::failure(ToolPayload::Empty {}, e.kind(), e.to_string()),
        };

        match Self::report_for(city, Utc::now()) {
            Ok(report) => ToolResult::success(ToolPayload::Weather(report)),
            Err(message) => {
                ToolResult::failure(ToolPayload::Empty {}, ErrorKind::InvalidArgument, message)
            }
        }
    }
}
