pub mod rag;
pub mod scrape;
pub mod search;
pub mod traits;
pub mod weather;

pub use rag::{AddDocumentTool, RagSearchTool};
pub use scrape::{ScrapeSettings, WebScrapeTool};
pub use search::{GoogleSearchTool, SearchSettings};
pub use traits::{Tool, ToolDefinition};
pub use weather::WeatherTool;

use crate::error::{ErrorKind, ToolError};
use crate::types::{ToolPayload, ToolResult};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Routing table from tool name to handler. Whatever orchestrates the
/// tools (the agent runner, the CLI) dispatches through here.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("Tool '{}' registered twice; keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Definitions for the named subset; unknown names are skipped.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    /// Execute a tool call by name. Unknown names become error results.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!("Unknown tool requested: {}", name);
            return ToolResult::failure(
                ToolPayload::Empty {},
                ErrorKind::InvalidArgument,
                format!("Unknown tool: {}", name),
            );
        };

        info!("Tool: {}({})", name, args);
        let result = tool.execute(args).await;

        if result.is_success() {
            info!("Tool {} succeeded ({} chars)", name, result.to_output().len());
        } else {
            warn!(
                "Tool {} failed: {}",
                name,
                result.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgument(format!("missing '{}' argument", key)))
}

fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArgument(format!("'{}' must be a non-negative integer", key))),
    }
}

/// Result schema: the tool's own fields plus the shared status/error fields.
fn result_schema(properties: Value) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        "status".into(),
        json!({"type": "string", "enum": ["success", "error"]}),
    );
    props.insert(
        "error".into(),
        json!({"type": "string", "description": "Present only when status is error"}),
    );
    props.insert(
        "error_kind".into(),
        json!({
            "type": "string",
            "enum": ["configuration_missing", "transient_network", "upstream_error", "invalid_argument", "internal"]
        }),
    );
    if let Value::Object(own) = properties {
        props.extend(own);
    }
    json!({"type": "object", "properties": props, "required": ["status"]})
}
