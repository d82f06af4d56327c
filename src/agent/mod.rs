pub mod graph;
pub mod runner;
pub mod system_prompt;

pub use graph::{AgentGraph, AgentSpec, TRANSFER_TOOL};
pub use runner::{AgentRunner, RunLimits, RunOutcome};
