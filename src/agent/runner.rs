//! Agent runner: Think → Act → Observe over the delegation graph.
//!
//! Each run:
//! 1. Builds the active agent's system prompt and tool list
//! 2. Calls inference
//! 3. Executes tool calls (or hands over to a sub-agent)
//! 4. Feeds results back until the model answers in plain text

use super::graph::{AgentGraph, AgentSpec, TRANSFER_TOOL};
use super::system_prompt::build_system_prompt;
use crate::config::AppConfig;
use crate::error::ErrorKind;
use crate::llm::ChatModel;
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::types::*;
use anyhow::{anyhow, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Bounds on a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_turns: u32,
    pub max_tool_calls_per_turn: u32,
    pub max_tokens_per_turn: u32,
}

impl RunLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_turns: config.max_turns.max(1),
            max_tool_calls_per_turn: config.max_tool_calls_per_turn.max(1),
            max_tokens_per_turn: config.max_tokens_per_turn.max(1),
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Agent that was active when the run ended.
    pub agent: String,
    pub reply: String,
    pub turns: u32,
    pub tool_results: Vec<ToolResult>,
    pub usage: TokenUsage,
}

pub struct AgentRunner {
    graph: Arc<AgentGraph>,
    tools: ToolRegistry,
    chat: Arc<dyn ChatModel>,
    limits: RunLimits,
}

impl AgentRunner {
    pub fn new(
        graph: Arc<AgentGraph>,
        tools: ToolRegistry,
        chat: Arc<dyn ChatModel>,
        limits: RunLimits,
    ) -> Self {
        Self {
            graph,
            tools,
            chat,
            limits,
        }
    }

    /// Run `question` from the graph's root agent.
    pub async fn run(&self, question: &str) -> Result<RunOutcome> {
        self.run_from(self.graph.root(), question).await
    }

    /// Run `question` starting at `agent_name`. Only an unknown agent is an
    /// error; model and tool failures end up in the reply.
    pub async fn run_from(&self, agent_name: &str, question: &str) -> Result<RunOutcome> {
        let mut active = self
            .graph
            .get(agent_name)
            .ok_or_else(|| anyhow!("Unknown agent '{}'", agent_name))?;

        let run_id = ulid::Ulid::new().to_string();
        info!("[{}] Run started at '{}'", run_id, active.name);

        let mut history = vec![ChatMessage::user(question)];
        let mut tool_results = Vec::new();
        let mut usage = TokenUsage::default();
        let mut last_content = String::new();

        for turn in 1..=self.limits.max_turns {
            let system_prompt = build_system_prompt(active, &self.graph, &self.tools);
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(ChatMessage::system(system_prompt));
            messages.extend(history.iter().cloned());

            let tool_defs = self.tool_definitions(active);

            let response = match self
                .chat
                .infer(&active.model, &messages, &tool_defs, self.limits.max_tokens_per_turn)
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    error!("[{}] Inference error on turn {}: {:#}", run_id, turn, e);
                    return Ok(RunOutcome {
                        run_id,
                        agent: active.name.clone(),
                        reply: format!("Sorry, I couldn't complete that request: {:#}", e),
                        turns: turn,
                        tool_results,
                        usage,
                    });
                }
            };

            usage.prompt_tokens += response.usage.prompt_tokens;
            usage.completion_tokens += response.usage.completion_tokens;
            usage.total_tokens += response.usage.total_tokens;

            let content = response.content.unwrap_or_default();
            if !content.is_empty() {
                info!(
                    "[{}] [Turn {}] {}: {}",
                    run_id,
                    turn,
                    active.name,
                    content.chars().take(200).collect::<String>()
                );
                last_content = content.clone();
            }

            if response.tool_calls.is_empty() {
                return Ok(RunOutcome {
                    run_id,
                    agent: active.name.clone(),
                    reply: content,
                    turns: turn,
                    tool_results,
                    usage,
                });
            }

            let limit = self.limits.max_tool_calls_per_turn as usize;
            if response.tool_calls.len() > limit {
                warn!(
                    "[{}] [Turn {}] {} tool calls requested, executing {}",
                    run_id,
                    turn,
                    response.tool_calls.len(),
                    limit
                );
            }
            let calls: Vec<ToolCall> = response.tool_calls.into_iter().take(limit).collect();
            history.push(ChatMessage::assistant(content, calls.clone()));

            let mut handover: Option<&AgentSpec> = None;
            for tc in &calls {
                let mut result = if tc.name == TRANSFER_TOOL {
                    let (result, target) = self.transfer(active, &tc.arguments);
                    if target.is_some() {
                        handover = target;
                    }
                    result
                } else if active.tools.iter().any(|t| t == &tc.name) {
                    self.tools.execute(&tc.name, &tc.arguments).await
                } else {
                    ToolResult::failure(
                        ToolPayload::Empty {},
                        ErrorKind::InvalidArgument,
                        format!("Tool '{}' is not available to agent '{}'", tc.name, active.name),
                    )
                };
                result.tool_call_id = tc.id.clone();

                history.push(ChatMessage::tool(&tc.id, result.to_output()));
                tool_results.push(result);
            }

            if let Some(next) = handover {
                info!("[{}] Transfer {} -> {}", run_id, active.name, next.name);
                active = next;
            }
        }

        warn!(
            "[{}] Stopped after {} turns without a final answer",
            run_id, self.limits.max_turns
        );
        let reply = if last_content.is_empty() {
            format!(
                "Sorry, I couldn't finish that request within {} steps.",
                self.limits.max_turns
            )
        } else {
            last_content
        };

        Ok(RunOutcome {
            run_id,
            agent: active.name.clone(),
            reply,
            turns: self.limits.max_turns,
            tool_results,
            usage,
        })
    }

    /// Registered tools of `agent`, plus the transfer tool when it has sub-agents.
    fn tool_definitions(&self, agent: &AgentSpec) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions_for(&agent.tools);
        if agent.can_transfer() {
            defs.push(ToolDefinition {
                name: TRANSFER_TOOL.into(),
                description: "Hand the conversation to a sub-agent better suited to the request."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "agent_name": {
                            "type": "string",
                            "enum": agent.sub_agents,
                            "description": "Name of the sub-agent to transfer to"
                        }
                    },
                    "required": ["agent_name"]
                }),
                returns: serde_json::Value::Null,
            });
        }
        defs
    }

    fn transfer(
        &self,
        from: &AgentSpec,
        args: &serde_json::Value,
    ) -> (ToolResult, Option<&AgentSpec>) {
        let target = args
            .get("agent_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let next = from
            .sub_agents
            .iter()
            .any(|s| s == target)
            .then(|| self.graph.get(target))
            .flatten();

        match next {
            Some(spec) => (
                ToolResult::success(ToolPayload::Transfer {
                    agent_name: spec.name.clone(),
                }),
                Some(spec),
            ),
            None => (
                ToolResult::failure(
                    ToolPayload::Empty {},
                    ErrorKind::InvalidArgument,
                    format!(
                        "'{}' cannot transfer to '{}'; choose one of: {}",
                        from.name,
                        target,
                        from.sub_agents.join(", ")
                    ),
                ),
                None,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo a message."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"message": {"type": "string"}}})
        }
        fn output_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: &Value) -> ToolResult {
            let message = args["message"].as_str().unwrap_or_default().to_string();
            ToolResult::success(ToolPayload::Message { message })
        }
    }

    /// Replays canned responses and records which tools each turn offered.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<InferenceResponse>>>,
        offered: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<InferenceResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                offered: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn infer(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            _max_tokens: u32,
        ) -> Result<InferenceResponse> {
            assert_eq!(messages[0].role, ChatRole::System);
            self.offered
                .lock()
                .unwrap()
                .push(tools.iter().map(|t| t.name.clone()).collect());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text("out of script")))
        }
    }

    fn text(content: &str) -> InferenceResponse {
        InferenceResponse {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            },
        }
    }

    fn calls(calls: &[(&str, Value)]) -> InferenceResponse {
        InferenceResponse {
            content: None,
            tool_calls: calls
                .iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCall {
                    id: format!("call_{}", i),
                    name: name.to_string(),
                    arguments: args.clone(),
                })
                .collect(),
            usage: TokenUsage::default(),
        }
    }

    fn runner(chat: Arc<Scripted>, max_turns: u32, max_calls: u32) -> AgentRunner {
        let yaml = r#"
root: front
agents:
  - name: front
    description: Routes requests.
    sub_agents: [worker]
  - name: worker
    description: Does the work.
    tools: [echo]
"#;
        let graph = AgentGraph::from_yaml(yaml, "test-model").unwrap();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Echo));
        AgentRunner::new(
            Arc::new(graph),
            tools,
            chat,
            RunLimits {
                max_turns,
                max_tool_calls_per_turn: max_calls,
                max_tokens_per_turn: 256,
            },
        )
    }

    #[tokio::test]
    async fn plain_reply_ends_the_run() {
        let chat = Scripted::new(vec![Ok(text("Hello!"))]);
        let outcome = runner(chat, 8, 5).run("hi").await.unwrap();
        assert_eq!(outcome.reply, "Hello!");
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.agent, "front");
        assert_eq!(outcome.usage.total_tokens, 12);
        assert_eq!(outcome.run_id.len(), 26);
    }

    #[tokio::test]
    async fn transfer_then_tool_then_answer() {
        let chat = Scripted::new(vec![
            Ok(calls(&[(TRANSFER_TOOL, json!({"agent_name": "worker"}))])),
            Ok(calls(&[("echo", json!({"message": "ping"}))])),
            Ok(text("pong")),
        ]);
        let outcome = runner(chat.clone(), 8, 5).run("do it").await.unwrap();

        assert_eq!(outcome.reply, "pong");
        assert_eq!(outcome.agent, "worker");
        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.tool_results.len(), 2);
        assert_eq!(outcome.tool_results[0].to_json()["agent_name"], "worker");
        assert_eq!(outcome.tool_results[1].to_json()["message"], "ping");
        assert_eq!(outcome.tool_results[1].tool_call_id, "call_0");

        let offered = chat.offered.lock().unwrap();
        assert_eq!(offered[0], vec![TRANSFER_TOOL.to_string()]);
        assert_eq!(offered[1], vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn transfer_outside_sub_agents_is_refused() {
        let chat = Scripted::new(vec![
            Ok(calls(&[(TRANSFER_TOOL, json!({"agent_name": "nobody"}))])),
            Ok(text("ok")),
        ]);
        let outcome = runner(chat, 8, 5).run("x").await.unwrap();
        assert_eq!(outcome.agent, "front");
        assert!(!outcome.tool_results[0].is_success());
        assert!(outcome.tool_results[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("worker"));
    }

    #[tokio::test]
    async fn tools_outside_the_agent_are_refused() {
        let chat = Scripted::new(vec![
            Ok(calls(&[("echo", json!({"message": "sneaky"}))])),
            Ok(text("ok")),
        ]);
        let outcome = runner(chat, 8, 5).run("x").await.unwrap();
        assert_eq!(
            outcome.tool_results[0].error_kind,
            Some(ErrorKind::InvalidArgument)
        );
    }

    #[tokio::test]
    async fn tool_calls_per_turn_are_capped() {
        let chat = Scripted::new(vec![
            Ok(calls(&[(TRANSFER_TOOL, json!({"agent_name": "worker"}))])),
            Ok(calls(&[
                ("echo", json!({"message": "1"})),
                ("echo", json!({"message": "2"})),
                ("echo", json!({"message": "3"})),
            ])),
            Ok(text("done")),
        ]);
        let outcome = runner(chat, 8, 2).run("x").await.unwrap();
        // One transfer plus two of the three echoes.
        assert_eq!(outcome.tool_results.len(), 3);
    }

    #[tokio::test]
    async fn inference_failure_becomes_an_apology() {
        let chat = Scripted::new(vec![Err(
            ToolError::MissingConfig("GOOGLE_API_KEY is not set".into()).into()
        )]);
        let outcome = runner(chat, 8, 5).run("x").await.unwrap();
        assert!(outcome.reply.starts_with("Sorry"));
        assert!(outcome.reply.contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn turn_budget_is_enforced() {
        let chat = Scripted::new(vec![
            Ok(calls(&[(TRANSFER_TOOL, json!({"agent_name": "worker"}))])),
            Ok(calls(&[("echo", json!({"message": "again"}))])),
            Ok(calls(&[("echo", json!({"message": "again"}))])),
        ]);
        let outcome = runner(chat, 2, 5).run("x").await.unwrap();
        assert_eq!(outcome.turns, 2);
        assert!(outcome.reply.contains("within 2 steps"));
    }

    #[tokio::test]
    async fn unknown_start_agent_is_an_error() {
        let chat = Scripted::new(Vec::new());
        assert!(runner(chat, 8, 5).run_from("ghost", "x").await.is_err());
    }
}
