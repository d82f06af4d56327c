//! `web_scrape`: fetch a page and return a cleaned, bounded text excerpt.
//!
//! Tag stripping is pattern-based, not an HTML parse: entities are left
//! encoded and script/style bodies may survive as text.

use super::{required_str, result_schema, Tool};
use crate::types::{ScrapedPage, ToolPayload, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Appended when content was cut at the character limit.
pub const ELLIPSIS: &str = "...";

static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)(?:</body>|$)").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub timeout: Duration,
    pub max_chars: usize,
    pub user_agent: String,
}

pub struct WebScrapeTool {
    settings: ScrapeSettings,
    http: reqwest::Client,
}

impl WebScrapeTool {
    pub fn new(settings: ScrapeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to build scrape HTTP client")?;
        Ok(Self { settings, http })
    }

    /// GET `url` and return its cleaned text. Non-2xx is an error.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Scraping {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", url))?;

        let html = resp.text().await.context("Failed to read page body")?;
        Ok(clean_html(&html, self.settings.max_chars))
    }
}

/// Narrow to `<body>` when present, strip tags, collapse whitespace and
/// cut to `max_chars` characters (plus [`ELLIPSIS`] when cut).
pub fn clean_html(html: &str, max_chars: usize) -> String {
    let region = BODY
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());

    let text = TAG.replace_all(region, " ");
    let text = WHITESPACE.replace_all(&text, " ");
    truncate_chars(text.trim(), max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

#[async_trait]
impl Tool for WebScrapeTool {
    fn name(&self) -> &str {
        "web_scrape"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its visible text, whitespace-collapsed and truncated. \
         Use it on URLs returned by google_search."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    fn output_schema(&self) -> Value {
        result_schema(json!({
            "url": {"type": "string"},
            "content": {"type": "string", "description": "Cleaned text; empty on error"},
            "length": {"type": "integer", "description": "Characters in content"}
        }))
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let url = match required_str(args, "url") {
            Ok(url) => url,
            Err(e) => {
                return ToolResult::failure(
                    ToolPayload::ScrapeFailed {
                        url: String::new(),
                        content: String::new(),
                    },
                    e.kind(),
                    e.to_string(),
                )
            }
        };

        match self.fetch(url).await {
            Ok(content) => ToolResult::success(ToolPayload::Scrape(ScrapedPage {
                url: url.to_string(),
                length: content.chars().count(),
                content,
            })),
            Err(e) => ToolResult::from_error(
                ToolPayload::ScrapeFailed {
                    url: url.to_string(),
                    content: String::new(),
                },
                &e,
            ),
        }
    }
}
