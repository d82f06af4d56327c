//! Vector store boundary: one named collection, similarity query and insert.

pub mod chroma;
pub mod embed;
pub mod schema;
pub mod sqlite;

pub use chroma::ChromaStore;
pub use embed::HashingEmbedder;
pub use sqlite::SqliteStore;

use crate::error::ToolError;
use crate::types::{Document, RetrievedSet};
use anyhow::Result;
use async_trait::async_trait;

/// A collection in a vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this handle is bound to.
    fn collection(&self) -> &str;

    /// The `k` nearest documents to `text`, most similar first.
    /// An empty collection yields an empty set.
    async fn query(&self, text: &str, k: usize) -> Result<RetrievedSet>;

    /// Insert a document under its id.
    async fn add(&self, document: &Document) -> Result<()>;

    /// Number of documents in the collection.
    async fn count(&self) -> Result<usize>;
}

/// Stand-in for a store whose credentials are missing. Every call fails
/// with a configuration error.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    collection: String,
    reason: String,
}

impl UnavailableStore {
    pub fn new(collection: &str, reason: impl Into<String>) -> Self {
        Self {
            collection: collection.to_string(),
            reason: reason.into(),
        }
    }

    fn error(&self) -> anyhow::Error {
        ToolError::MissingConfig(self.reason.clone()).into()
    }
}

#[async_trait]
impl VectorStore for UnavailableStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, _text: &str, _k: usize) -> Result<RetrievedSet> {
        Err(self.error())
    }

    async fn add(&self, _document: &Document) -> Result<()> {
        Err(self.error())
    }

    async fn count(&self) -> Result<usize> {
        Err(self.error())
    }
}
