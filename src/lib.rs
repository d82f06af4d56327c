//! Uniplexity: research agent runtime.
//!
//! Tools for web search, page scraping and retrieval-augmented answers
//! over a vector store, exposed to a small graph of delegating agents.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod rag;
pub mod services;
pub mod store;
pub mod tools;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
