//! Retrieval service: one collection, nearest-neighbour query and insert.

use crate::error::ToolError;
use crate::store::VectorStore;
use crate::types::{Document, Metadata, RetrievedSet};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha3::{Digest, Sha3_256};
use std::sync::Arc;
use tracing::{debug, info};

/// Wraps a vector store collection. Single attempt per call, no retry:
/// the calling agent decides whether to re-invoke.
#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn VectorStore>,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    /// The `k` documents most similar to `question`, most similar first.
    pub async fn query(&self, question: &str, k: usize) -> Result<RetrievedSet> {
        if k == 0 {
            return Err(ToolError::InvalidArgument("k must be at least 1".into()).into());
        }

        let retrieved = self
            .store
            .query(question, k)
            .await
            .with_context(|| format!("Query against '{}' failed", self.collection()))?;

        debug!(
            "Retrieved {} of {} requested documents for '{}'",
            retrieved.len(),
            k,
            question
        );
        Ok(retrieved)
    }

    /// Store `content` and return its new identifier. Ids are likely
    /// unique, not guaranteed: collisions are not checked.
    pub async fn add(&self, content: &str, metadata: Metadata) -> Result<String> {
        if content.trim().is_empty() {
            return Err(ToolError::InvalidArgument("document content is empty".into()).into());
        }
        validate_metadata(&metadata)?;

        let document = Document {
            id: document_id(content, Utc::now()),
            content: content.to_string(),
            metadata,
        };

        self.store
            .add(&document)
            .await
            .with_context(|| format!("Insert into '{}' failed", self.collection()))?;

        info!("Added document {} to '{}'", document.id, self.collection());
        Ok(document.id)
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }
}

/// Content-derived id: SHA3-256 of content plus a nanosecond timestamp,
/// truncated to 16 bytes, as 32 lowercase hex characters.
pub fn document_id(content: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(content.as_bytes());
    hasher.update(b"_");
    hasher.update(at.format("%s%.9f").to_string().as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Metadata values must be scalars (string, number, bool).
fn validate_metadata(metadata: &Metadata) -> Result<(), ToolError> {
    for (key, value) in metadata {
        if value.is_object() || value.is_array() || value.is_null() {
            return Err(ToolError::InvalidArgument(format!(
                "metadata value for '{}' must be a string, number or bool",
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use crate::store::{HashingEmbedder, SqliteStore, UnavailableStore};
    use chrono::TimeZone;
    use serde_json::json;

    fn service() -> RetrievalService {
        let store =
            SqliteStore::open_memory("kb", Arc::new(HashingEmbedder::default())).unwrap();
        RetrievalService::new(Arc::new(store))
    }

    #[test]
    fn document_id_is_32_hex_chars_and_time_sensitive() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 1).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_000, 2).unwrap();
        let a = document_id("The sky is blue.", t1);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(a, document_id("The sky is blue.", t1));
        assert_ne!(a, document_id("The sky is blue.", t2));
    }

    #[tokio::test]
    async fn add_then_query_finds_the_new_document() {
        let svc = service();
        svc.add("Rust has no garbage collector.", Metadata::new())
            .await
            .unwrap();
        let id = svc.add("The sky is blue.", Metadata::new()).await.unwrap();

        let hits = svc.query("What color is the sky?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, id);
    }

    #[tokio::test]
    async fn re_adding_same_content_yields_distinct_ids() {
        let svc = service();
        let a = svc.add("same text", Metadata::new()).await.unwrap();
        let b = svc.add("same text", Metadata::new()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rejects_zero_k_and_nested_metadata() {
        let svc = service();
        let err = svc.query("q", 0).await.unwrap_err();
        assert_eq!(classify(&err), ErrorKind::InvalidArgument);

        let mut meta = Metadata::new();
        meta.insert("tags".into(), json!(["a", "b"]));
        let err = svc.add("text", meta).await.unwrap_err();
        assert_eq!(classify(&err), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn store_failures_keep_their_class() {
        let svc = RetrievalService::new(Arc::new(UnavailableStore::new(
            "kb",
            "CHROMA_API_KEY is not set",
        )));
        let err = svc.query("q", 1).await.unwrap_err();
        assert_eq!(classify(&err), ErrorKind::ConfigurationMissing);
        assert!(format!("{:#}", err).contains("CHROMA_API_KEY"));
    }
}
