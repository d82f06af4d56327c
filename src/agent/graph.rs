//! Agent delegation graph: a routing table from agent name to spec.

use crate::config::AppConfig;
use crate::tools::ToolRegistry;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Name of the synthetic tool that hands the conversation to a sub-agent.
pub const TRANSFER_TOOL: &str = "transfer_to_agent";

/// Declarative description of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Empty means the configured agent model.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub sub_agents: Vec<String>,
}

impl AgentSpec {
    fn new(name: &str, model: &str, description: &str, instruction: &str) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            description: description.into(),
            instruction: instruction.into(),
            tools: Vec::new(),
            sub_agents: Vec::new(),
        }
    }

    fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    fn with_sub_agents(mut self, agents: &[&str]) -> Self {
        self.sub_agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn can_transfer(&self) -> bool {
        !self.sub_agents.is_empty()
    }
}

/// On-disk YAML shape.
#[derive(Debug, Deserialize)]
struct GraphFile {
    root: String,
    agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone)]
pub struct AgentGraph {
    root: String,
    agents: BTreeMap<String, AgentSpec>,
}

impl AgentGraph {
    /// Build a graph from specs. Agents without a model get `default_model`.
    pub fn new(root: &str, specs: Vec<AgentSpec>, default_model: &str) -> Result<Self> {
        let mut agents = BTreeMap::new();
        for mut spec in specs {
            if spec.name.trim().is_empty() {
                bail!("Agent with an empty name");
            }
            if spec.model.is_empty() {
                spec.model = default_model.to_string();
            }
            if let Some(prev) = agents.insert(spec.name.clone(), spec) {
                bail!("Agent '{}' is defined twice", prev.name);
            }
        }

        if !agents.contains_key(root) {
            bail!("Root agent '{}' is not defined", root);
        }

        Ok(Self {
            root: root.to_string(),
            agents,
        })
    }

    /// Built-in graph: coordinator → conversation → researcher (and the
    /// RAG agent when enabled), plus the standalone weather agent.
    pub fn default_for(config: &AppConfig) -> Self {
        let model = config.agent_model.as_str();

        let mut conversation_subs = vec!["researcher"];
        let mut conversation_instruction = String::from(
            "You are a friendly assistant. Delegate research tasks to the researcher agent.",
        );
        if config.rag_enabled {
            conversation_subs.push("rag_agent");
            conversation_instruction.push_str(
                " Delegate questions about stored knowledge, and requests to remember \
                 something, to the rag_agent.",
            );
        }

        let mut specs = vec![
            AgentSpec::new(
                "coordinator",
                model,
                "Routes tasks to appropriate agents.",
                "Route user queries to the conversation agent.",
            )
            .with_sub_agents(&["conversation"]),
            AgentSpec::new(
                "conversation",
                model,
                "Handles user queries by delegating to other agents.",
                &conversation_instruction,
            )
            .with_sub_agents(&conversation_subs),
            AgentSpec::new(
                "researcher",
                model,
                "Fetches information using search tools.",
                "Use the google_search tool to find information. Use web_scrape on the most \
                 relevant result URLs when snippets are not enough, then summarize what you \
                 found and cite the URLs.",
            )
            .with_tools(&["google_search", "web_scrape"]),
            AgentSpec::new(
                "weather_agent",
                model,
                "Answers weather queries for cities.",
                "Use get_weather to provide accurate weather info.",
            )
            .with_tools(&["get_weather"]),
        ];

        if config.rag_enabled {
            specs.push(
                AgentSpec::new(
                    "rag_agent",
                    model,
                    "Performs RAG (Retrieval-Augmented Generation) to answer questions using \
                     stored knowledge.",
                    "You answer questions from the internal knowledge base. When answering:\n\
                     1. Use rag_search to find relevant information.\n\
                     2. Give a detailed answer based on the retrieved documents.\n\
                     3. Cite the documents when possible.\n\
                     4. If nothing relevant is found, say so clearly.\n\
                     Use add_document when asked to store new information.",
                )
                .with_tools(&["rag_search", "add_document"]),
            );
        }

        let agents = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            root: "coordinator".into(),
            agents,
        }
    }

    pub fn from_yaml(yaml: &str, default_model: &str) -> Result<Self> {
        let file: GraphFile = serde_yaml::from_str(yaml).context("Failed to parse agent graph (YAML)")?;
        Self::new(&file.root, file.agents, default_model)
    }

    pub fn load(path: &Path, default_model: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent graph at {}", path.display()))?;
        Self::from_yaml(&contents, default_model)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.get(name)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentSpec> {
        self.agents.values()
    }

    /// Agents no other agent delegates to. The configured root comes first.
    pub fn entry_points(&self) -> Vec<&str> {
        let referenced: BTreeSet<&str> = self
            .agents
            .values()
            .flat_map(|a| a.sub_agents.iter().map(String::as_str))
            .collect();

        let mut entries = vec![self.root.as_str()];
        entries.extend(
            self.agents
                .keys()
                .map(String::as_str)
                .filter(|n| *n != self.root && !referenced.contains(n)),
        );
        entries
    }

    /// Check that every sub-agent exists and every tool is registered.
    pub fn validate(&self, registry: &ToolRegistry) -> Result<()> {
        for agent in self.agents.values() {
            for sub in &agent.sub_agents {
                if sub == &agent.name {
                    bail!("Agent '{}' lists itself as a sub-agent", agent.name);
                }
                if !self.agents.contains_key(sub) {
                    bail!("Agent '{}' delegates to unknown agent '{}'", agent.name, sub);
                }
            }
            for tool in &agent.tools {
                if tool == TRANSFER_TOOL {
                    bail!("Agent '{}' lists reserved tool '{}'", agent.name, TRANSFER_TOOL);
                }
                if !registry.contains(tool) {
                    bail!("Agent '{}' uses unregistered tool '{}'", agent.name, tool);
                }
            }
        }
        Ok(())
    }

    /// Indented delegation tree, one entry point after another.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for entry in self.entry_points() {
            let mut path = Vec::new();
            self.render_node(entry, 0, &mut path, &mut out);
        }
        out
    }

    fn render_node<'a>(&'a self, name: &'a str, depth: usize, path: &mut Vec<&'a str>, out: &mut String) {
        let indent = "  ".repeat(depth);
        let Some(agent) = self.agents.get(name) else {
            out.push_str(&format!("{}- {} (undefined)\n", indent, name));
            return;
        };

        out.push_str(&format!("{}- {}", indent, agent.name));
        if !agent.tools.is_empty() {
            out.push_str(&format!(" [{}]", agent.tools.join(", ")));
        }
        if path.contains(&name) {
            out.push_str(" (cycle)\n");
            return;
        }
        out.push('\n');

        path.push(name);
        for sub in &agent.sub_agents {
            self.render_node(sub, depth + 1, path, out);
        }
        path.pop();
    }
}
