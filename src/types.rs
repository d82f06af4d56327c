//! Shared types used across the uniplexity runtime.

use crate::error::{classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar-valued metadata attached to a stored document.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// A unit of stored knowledge. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A document returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    /// Similarity to the query; higher is closer.
    pub score: f32,
}

/// Documents ranked by similarity, most relevant first, at most `k` long.
pub type RetrievedSet = Vec<ScoredDocument>;

// ---------------------------------------------------------------------------
// Tool results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source_domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub query: String,
    /// All hits pre-rendered for direct inclusion in a prompt.
    pub results: String,
    pub total_results: u64,
    /// Provider-reported latency in seconds.
    pub search_time: f64,
    pub raw_results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub content: String,
    /// Length of `content` in characters.
    pub length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub question: String,
    pub retrieved_documents: Vec<String>,
    pub answer: String,
    #[serde(rename = "num_docs_retrieved")]
    pub doc_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAdded {
    pub message: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub city: String,
    pub report: String,
}

/// Tool-specific body of a [`ToolResult`], flattened next to `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Search(SearchReport),
    SearchFailed { query: String, results: String },
    Scrape(ScrapedPage),
    ScrapeFailed { url: String, content: String },
    Answer(RagAnswer),
    AnswerFailed { question: String, answer: String },
    Added(DocumentAdded),
    Weather(WeatherReport),
    Transfer { agent_name: String },
    Message { message: String },
    Empty {},
}

/// The uniform contract every tool returns. Failures are values, not
/// errors: `status` tells them apart and `error_detail` carries the cause.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    /// Set by the agent runner when the call came from a model.
    #[serde(skip)]
    pub tool_call_id: String,
    pub status: ToolStatus,
    #[serde(flatten)]
    pub payload: ToolPayload,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    pub fn success(payload: ToolPayload) -> Self {
        Self {
            tool_call_id: String::new(),
            status: ToolStatus::Success,
            payload,
            error_detail: None,
            error_kind: None,
        }
    }

    pub fn failure(payload: ToolPayload, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            status: ToolStatus::Error,
            payload,
            error_detail: Some(detail.into()),
            error_kind: Some(kind),
        }
    }

    /// Build a failure from an error chain, classifying it on the way.
    pub fn from_error(payload: ToolPayload, err: &anyhow::Error) -> Self {
        Self::failure(payload, classify(err), format!("{:#}", err))
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// JSON rendering handed back to the model and printed by the CLI.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "error": format!("unserializable result: {e}") })
        })
    }

    pub fn to_output(&self) -> String {
        self.to_json().to_string()
    }
}

// ---------------------------------------------------------------------------
// Inference types
// ---------------------------------------------------------------------------

/// A chat message in the multi-turn conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: ChatRole, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call request from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Response from inference including potential tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Token usage from an inference call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;

    #[test]
    fn success_result_flattens_payload() {
        let result = ToolResult::success(ToolPayload::Scrape(ScrapedPage {
            url: "https://example.com".into(),
            content: "hello".into(),
            length: 5,
        }));
        let json = result.to_json();
        assert_eq!(json["status"], "success");
        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["length"], 5);
        assert!(json.get("error").is_none());
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn failure_result_carries_detail_and_kind() {
        let err = anyhow::Error::new(ToolError::Network("connection refused".into()))
            .context("fetch failed");
        let result = ToolResult::from_error(
            ToolPayload::ScrapeFailed {
                url: "http://127.0.0.1:1".into(),
                content: String::new(),
            },
            &err,
        );
        assert!(!result.is_success());
        let json = result.to_json();
        assert_eq!(json["status"], "error");
        assert_eq!(json["content"], "");
        assert_eq!(json["error_kind"], "transient_network");
        assert_eq!(json["error"], "fetch failed: network error: connection refused");
    }

    #[test]
    fn empty_payload_serializes_status_only() {
        let result = ToolResult::failure(ToolPayload::Empty {}, ErrorKind::Internal, "boom");
        let json = result.to_json();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }
}
