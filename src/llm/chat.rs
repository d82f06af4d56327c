//! Tool-calling chat inference against an OpenAI-compatible endpoint.
//!
//! Drives the agent graph; the Generative Language API exposes this
//! surface under `/v1beta/openai`.

use crate::error::ToolError;
use crate::tools::ToolDefinition;
use crate::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat client used by the agent runner.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: ChatRole,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'a str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCallPayload {
    id: String,
    r#type: String,
    function: FunctionCallPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCallPayload {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<&ChatMessage> for MessagePayload {
    fn from(m: &ChatMessage) -> Self {
        let tool_calls = if m.tool_calls.is_empty() {
            None
        } else {
            Some(
                m.tool_calls
                    .iter()
                    .map(|tc| ToolCallPayload {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: FunctionCallPayload {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        Self {
            role: m.role,
            content: if m.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(m.content.clone())
            },
            tool_calls,
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build chat HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    /// Run inference with tool support. Returns a response with optional tool calls.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<InferenceResponse> {
        if self.api_key.is_empty() {
            return Err(ToolError::MissingConfig("GOOGLE_API_KEY is not set".into()).into());
        }

        let url = format!("{}/chat/completions", self.base_url);

        let tool_payloads: Option<Vec<ToolPayload>> = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ToolPayload {
                        r#type: "function",
                        function: FunctionPayload {
                            name: &t.name,
                            description: &t.description,
                            parameters: &t.parameters,
                        },
                    })
                    .collect(),
            )
        };

        let request = ChatRequest {
            model,
            messages: messages.iter().map(MessagePayload::from).collect(),
            tools: tool_payloads,
            max_tokens,
            temperature: 0.7,
        };

        debug!("Inference request to model: {}", model);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))
            .context("Inference request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                service: "inference",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse inference response")?;
        Ok(parse_response(body))
    }
}

#[async_trait]
impl super::ChatModel for ChatClient {
    async fn infer(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<InferenceResponse> {
        self.chat(model, messages, tools, max_tokens).await
    }
}

fn parse_response(body: ChatResponse) -> InferenceResponse {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .unwrap_or_default();

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let args: serde_json::Value =
                serde_json::from_str(&tc.function.arguments).unwrap_or_default();
            ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: args,
            }
        })
        .collect();

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    InferenceResponse {
        content: message.content.filter(|c| !c.is_empty()),
        tool_calls,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_calls_and_usage() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "google_search", "arguments": "{\"query\":\"rust\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }))
        .unwrap();

        let resp = parse_response(body);
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "google_search");
        assert_eq!(resp.tool_calls[0].arguments["query"], "rust");
        assert_eq!(resp.usage.total_tokens, 13);
    }

    #[test]
    fn empty_choices_yield_empty_response() {
        let body: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let resp = parse_response(body);
        assert!(resp.content.is_none());
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn assistant_tool_call_message_round_trips_arguments_as_string() {
        let msg = ChatMessage::assistant(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "web_scrape".into(),
                arguments: json!({"url": "https://example.com"}),
            }],
        );
        let payload = serde_json::to_value(MessagePayload::from(&msg)).unwrap();
        assert_eq!(payload["role"], "assistant");
        assert!(payload["content"].is_null());
        assert_eq!(
            payload["tool_calls"][0]["function"]["arguments"],
            "{\"url\":\"https://example.com\"}"
        );
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let client = ChatClient::new("http://127.0.0.1:1", "", Duration::from_secs(1)).unwrap();
        let err = client
            .chat("m", &[ChatMessage::user("hi")], &[], 16)
            .await
            .unwrap_err();
        assert_eq!(
            crate::error::classify(&err),
            crate::error::ErrorKind::ConfigurationMissing
        );
    }
}
