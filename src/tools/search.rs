//! `google_search`: Custom Search JSON API, normalized into search hits.

use super::{optional_u64, required_str, result_schema, Tool};
use crate::error::ToolError;
use crate::types::{SearchHit, SearchReport, ToolPayload, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Hits requested when the caller gives no count.
const DEFAULT_NUM_RESULTS: u32 = 5;

/// Divider between rendered hits.
const HIT_DIVIDER: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub api_url: String,
    pub api_key: String,
    pub engine_id: String,
    /// Provider per-call maximum.
    pub max_results: u32,
    pub timeout: Duration,
}

pub struct GoogleSearchTool {
    settings: SearchSettings,
    http: reqwest::Client,
}

// -- Response types ---------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
    search_information: Option<SearchInformation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    display_link: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    /// Reported as a decimal string.
    total_results: Option<String>,
    search_time: Option<f64>,
}

impl GoogleSearchTool {
    pub fn new(settings: SearchSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self { settings, http })
    }

    fn clamp(&self, requested: u64) -> u32 {
        let max = self.settings.max_results.max(1);
        requested.clamp(1, u64::from(max)) as u32
    }

    /// Query the provider and normalize the hits.
    pub async fn search(&self, query: &str, num_results: u32) -> Result<SearchReport> {
        if self.settings.api_key.is_empty() || self.settings.engine_id.is_empty() {
            return Err(ToolError::MissingConfig(
                "GOOGLE_CSE_API_KEY and GOOGLE_CSE_ID must be set".into(),
            )
            .into());
        }

        let num = self.clamp(u64::from(num_results)).to_string();
        debug!("Search '{}' ({} results)", query, num);

        let resp = self
            .http
            .get(&self.settings.api_url)
            .query(&[
                ("key", self.settings.api_key.as_str()),
                ("cx", self.settings.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                service: "search",
                status: status.as_u16(),
                body: provider_message(&body),
            }
            .into());
        }

        let body: CseResponse = resp
            .json()
            .await
            .context("Failed to parse search response")?;
        Ok(into_report(query, body))
    }

    async fn run(&self, args: &Value) -> Result<SearchReport> {
        let query = required_str(args, "query")?;
        let num = optional_u64(args, "num_results")?.unwrap_or(u64::from(DEFAULT_NUM_RESULTS));
        self.search(query, self.clamp(num)).await
    }
}

/// Pull `error.message` out of a provider error body when there is one.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn into_report(query: &str, body: CseResponse) -> SearchReport {
    let hits: Vec<SearchHit> = body
        .items
        .into_iter()
        .map(|item| SearchHit {
            title: item.title,
            url: item.link,
            snippet: item.snippet,
            source_domain: item.display_link,
        })
        .collect();

    let info = body.search_information.unwrap_or_default();
    SearchReport {
        query: query.to_string(),
        results: render_hits(query, &hits),
        total_results: info
            .total_results
            .and_then(|t| t.parse().ok())
            .unwrap_or(hits.len() as u64),
        search_time: info.search_time.unwrap_or(0.0),
        raw_results: hits,
    }
}

/// Human-readable rendering of all hits for direct use in a prompt.
pub fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for '{}'.", query);
    }

    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "{}. {}\n   URL: {}\n   Snippet: {}\n   Source: {}",
                i + 1,
                h.title,
                h.url,
                h.snippet.replace('\n', " "),
                h.source_domain
            )
        })
        .collect();

    format!("Search results for '{}':\n\n{}", query, blocks.join(HIT_DIVIDER))
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Search the web with Google Custom Search. Returns titles, URLs, snippets and \
         source domains, plus a pre-formatted summary. Follow up with web_scrape to read a page."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": format!(
                        "Number of results (default {}, max {})",
                        DEFAULT_NUM_RESULTS, self.settings.max_results
                    )
                }
            },
            "required": ["query"]
        })
    }

    fn output_schema(&self) -> Value {
        result_schema(json!({
            "query": {"type": "string"},
            "results": {"type": "string", "description": "Formatted hits, or the failure message"},
            "total_results": {"type": "integer"},
            "search_time": {"type": "number"},
            "raw_results": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "url": {"type": "string"},
                        "snippet": {"type": "string"},
                        "source_domain": {"type": "string"}
                    }
                }
            }
        }))
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();

        match self.run(args).await {
            Ok(report) => ToolResult::success(ToolPayload::Search(report)),
            Err(e) => {
                let message = format!("Search failed for query '{}': {:#}", query, e);
                ToolResult::from_error(
                    ToolPayload::SearchFailed {
                        query: query.to_string(),
                        results: message,
                    },
                    &e,
                )
            }
        }
    }
}
