//! Chroma v2 REST client bound to one collection.

use super::VectorStore;
use crate::error::ToolError;
use crate::llm::Embedder;
use crate::types::{Document, Metadata, RetrievedSet, ScoredDocument};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Connection settings for a Chroma deployment.
#[derive(Debug, Clone)]
pub struct ChromaSettings {
    pub base_url: String,
    pub api_key: String,
    pub tenant: String,
    pub database: String,
    pub timeout: Duration,
}

/// A Chroma collection. The collection id is resolved with
/// `get_or_create` on first use and cached for the life of the handle.
pub struct ChromaStore {
    settings: ChromaSettings,
    collection: String,
    collection_id: OnceCell<String>,
    embedder: Arc<dyn Embedder>,
    http: reqwest::Client,
}

// -- Request / response types -----------------------------------------------

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    ids: [&'a str; 1],
    embeddings: [Vec<f32>; 1],
    documents: [&'a str; 1],
    /// Chroma rejects empty metadata maps, so those are sent as null.
    metadatas: [Option<&'a Metadata>; 1],
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [Vec<f32>; 1],
    n_results: usize,
    include: [&'a str; 3],
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaStore {
    pub fn new(
        settings: ChromaSettings,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build Chroma HTTP client")?;

        Ok(Self {
            settings: ChromaSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
            collection: collection.to_string(),
            collection_id: OnceCell::new(),
            embedder,
            http,
        })
    }

    fn database_url(&self, path: &str) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/{}",
            self.settings.base_url, self.settings.tenant, self.settings.database, path
        )
    }

    async fn collection_url(&self, action: &str) -> Result<String> {
        let id = self
            .collection_id
            .get_or_try_init(|| self.resolve_collection())
            .await?;
        Ok(self.database_url(&format!("collections/{}/{}", id, action)))
    }

    async fn resolve_collection(&self) -> Result<String> {
        let body: CollectionResponse = self
            .send(self.http.post(self.database_url("collections")).json(
                &CreateCollectionRequest {
                    name: &self.collection,
                    get_or_create: true,
                },
            ))
            .await?
            .json()
            .await
            .context("Failed to parse Chroma collection response")?;

        info!("Chroma collection '{}' resolved to {}", self.collection, body.id);
        Ok(body.id)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .header("x-chroma-token", &self.settings.api_key)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))
            .context("Chroma request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                service: "chroma",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(resp)
    }
}

/// Flatten the first query's columns into ranked documents. Chroma orders
/// by ascending distance, which is kept as-is.
fn into_retrieved(resp: QueryResponse) -> RetrievedSet {
    let ids = resp.ids.into_iter().next().unwrap_or_default();
    let mut documents = resp
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = resp
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut distances = resp
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    ids.into_iter()
        .map(|id| {
            let content = documents.next().flatten().unwrap_or_default();
            let metadata = metadatas.next().flatten().unwrap_or_default();
            let distance = distances.next().flatten().unwrap_or(f32::MAX);
            ScoredDocument {
                document: Document {
                    id,
                    content,
                    metadata,
                },
                score: 1.0 / (1.0 + distance.max(0.0)),
            }
        })
        .collect()
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, text: &str, k: usize) -> Result<RetrievedSet> {
        let embedding = self.embedder.embed(text).await?;
        let url = self.collection_url("query").await?;

        let resp: QueryResponse = self
            .send(self.http.post(url).json(&QueryRequest {
                query_embeddings: [embedding],
                n_results: k,
                include: ["documents", "metadatas", "distances"],
            }))
            .await?
            .json()
            .await
            .context("Failed to parse Chroma query response")?;

        let retrieved = into_retrieved(resp);
        debug!(
            "Chroma query over '{}' returned {} documents",
            self.collection,
            retrieved.len()
        );
        Ok(retrieved)
    }

    async fn add(&self, document: &Document) -> Result<()> {
        let embedding = self.embedder.embed(&document.content).await?;
        let url = self.collection_url("add").await?;
        let metadata = (!document.metadata.is_empty()).then_some(&document.metadata);

        self.send(self.http.post(url).json(&AddRequest {
            ids: [document.id.as_str()],
            embeddings: [embedding],
            documents: [document.content.as_str()],
            metadatas: [metadata],
        }))
        .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let url = self.collection_url("count").await?;
        self.send(self.http.get(url))
            .await?
            .json()
            .await
            .context("Failed to parse Chroma count response")
    }
}
