//! Tool trait definition.

use crate::types::ToolResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Definition of a tool exposed to the inference model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: serde_json::Value,
    /// JSON Schema of the result record. Not sent to the model.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub returns: serde_json::Value,
}

/// A callable capability an agent may invoke.
///
/// `execute` is the terminal catch point for failures: it always returns a
/// [`ToolResult`], with `status = error` when anything went wrong.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in function calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// JSON Schema for the tool's result record.
    fn output_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: &serde_json::Value) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            returns: self.output_schema(),
        }
    }
}
