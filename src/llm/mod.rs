//! Model boundaries: text completion, embeddings and tool-calling chat.

pub mod chat;
pub mod gemini;

pub use chat::ChatClient;
pub use gemini::GeminiClient;

use crate::error::ToolError;
use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, InferenceResponse};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A generative completion call. The response shape is provider-defined
/// and not guaranteed stable, so it is returned raw; see [`extract_text`].
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Value>;
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Tool-calling chat inference, as driven by the agent runner.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn infer(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<InferenceResponse>;
}

/// Pull the answer text out of a completion response.
///
/// Tries, in order: a top-level `text` field, the `candidates[].content.parts[].text`
/// nesting, an `output` field. Falls back to the whole response as JSON.
pub fn extract_text(response: &Value) -> String {
    if let Some(text) = response.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }

    if let Some(parts) = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    {
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return text;
        }
    }

    match response.get("output") {
        Some(Value::String(s)) if !s.is_empty() => return s.clone(),
        Some(Value::Null) | None => {}
        Some(other) => return other.to_string(),
    }

    response.to_string()
}

/// Stand-in for a completion backend whose credentials are missing.
#[derive(Debug, Clone)]
pub struct UnavailableCompletion {
    reason: String,
}

impl UnavailableCompletion {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Completion for UnavailableCompletion {
    async fn generate(&self, _prompt: &str, _max_output_tokens: u32) -> Result<Value> {
        Err(ToolError::MissingConfig(self.reason.clone()).into())
    }
}

#[async_trait]
impl Embedder for UnavailableCompletion {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ToolError::MissingConfig(self.reason.clone()).into())
    }
}
