//! System prompt builder for one agent of the graph.
//!
//! Layers (in order):
//! 1. Role (name and description)
//! 2. Instruction
//! 3. Tools the agent may call
//! 4. Sub-agents it may hand the conversation to

use super::graph::{AgentGraph, AgentSpec, TRANSFER_TOOL};
use crate::tools::ToolRegistry;
use tracing::debug;

/// Shared ground rules for every agent.
const GROUND_RULES: &str = r#"
# Ground Rules

Tools return JSON with a `status` field. When `status` is `error`, tell the
user what failed instead of inventing an answer. Only state facts that come
from tool results or from the conversation.
"#;

pub fn build_system_prompt(agent: &AgentSpec, graph: &AgentGraph, tools: &ToolRegistry) -> String {
    let mut prompt = String::with_capacity(2048);

    // Layer 1: Role
    prompt.push_str(&format!("# Role\n\nYou are `{}`.", agent.name));
    if !agent.description.is_empty() {
        prompt.push(' ');
        prompt.push_str(&agent.description);
    }
    prompt.push('\n');

    // Layer 2: Instruction
    if !agent.instruction.is_empty() {
        prompt.push_str("\n# Instruction\n\n");
        prompt.push_str(agent.instruction.trim());
        prompt.push('\n');
    }

    prompt.push_str(GROUND_RULES);

    // Layer 3: Tools
    let available: Vec<_> = agent
        .tools
        .iter()
        .filter_map(|name| tools.get(name))
        .collect();
    if !available.is_empty() {
        prompt.push_str("\n# Tools\n\n");
        for tool in available {
            prompt.push_str(&format!("- `{}`: {}\n", tool.name(), tool.description()));
        }
    }

    // Layer 4: Delegation
    if agent.can_transfer() {
        prompt.push_str(&format!(
            "\n# Delegation\n\nCall `{}` with `agent_name` set to one of these agents when \
             the request is theirs to handle:\n\n",
            TRANSFER_TOOL
        ));
        for sub in &agent.sub_agents {
            let description = graph
                .get(sub)
                .map(|s| s.description.as_str())
                .unwrap_or_default();
            prompt.push_str(&format!("- `{}`: {}\n", sub, description));
        }
    }

    debug!("System prompt for {}: {} chars", agent.name, prompt.len());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tools::WeatherTool;
    use std::sync::Arc;

    #[test]
    fn lists_tools_and_sub_agents() {
        let graph = AgentGraph::default_for(&AppConfig::default());
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(WeatherTool::new()));

        let weather = build_system_prompt(graph.get("weather_agent").unwrap(), &graph, &tools);
        assert!(weather.contains("You are `weather_agent`. Answers weather queries for cities."));
        assert!(weather.contains("- `get_weather`: "));
        assert!(!weather.contains(TRANSFER_TOOL));

        let conversation = build_system_prompt(graph.get("conversation").unwrap(), &graph, &tools);
        assert!(conversation.contains(TRANSFER_TOOL));
        assert!(conversation.contains("- `researcher`: Fetches information using search tools."));
        assert!(conversation.contains("- `rag_agent`: "));
        assert!(!conversation.contains("# Tools"));
    }
}
