//! Local document store on SQLite with brute-force cosine ranking.
//!
//! DB work is offloaded via `spawn_blocking` so sqlite I/O does not
//! block the async runtime.

use super::embed::cosine_similarity;
use super::schema;
use super::VectorStore;
use crate::llm::Embedder;
use crate::types::{Document, Metadata, RetrievedSet, ScoredDocument};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A collection stored in a local SQLite file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn, collection, embedder)
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory(collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, collection, embedder)
    }

    fn with_connection(
        conn: Connection,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            embedder,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }
}

/// Run schema creation and migrations.
fn migrate(conn: &Connection) -> Result<()> {
    let version: u32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if version == 0 {
        info!("Creating document store schema v{}", schema::SCHEMA_VERSION);
        conn.execute_batch(schema::CREATE_SCHEMA)
            .context("Failed to create schema")?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![schema::SCHEMA_VERSION],
        )?;
    } else if version > schema::SCHEMA_VERSION {
        anyhow::bail!(
            "Document store schema v{} is newer than supported v{}",
            version,
            schema::SCHEMA_VERSION
        );
    }

    Ok(())
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, text: &str, k: usize) -> Result<RetrievedSet> {
        let query_vec = self.embedder.embed(text).await?;
        let collection = self.collection.clone();

        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, metadata_json, embedding FROM documents
                     WHERE collection = ?1 ORDER BY seq",
                )?;
                let rows = stmt
                    .query_map(params![collection], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Vec<u8>>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, content, metadata_json, embedding) in rows {
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            let score = cosine_similarity(&query_vec, &decode_embedding(&embedding));
            scored.push(ScoredDocument {
                document: Document {
                    id,
                    content,
                    metadata,
                },
                score,
            });
        }

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(
            "SQLite query over '{}' returned {} documents",
            self.collection,
            scored.len()
        );
        Ok(scored)
    }

    async fn add(&self, document: &Document) -> Result<()> {
        let embedding = encode_embedding(&self.embedder.embed(&document.content).await?);
        let metadata_json = serde_json::to_string(&document.metadata)?;
        let collection = self.collection.clone();
        let id = document.id.clone();
        let content = document.content.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, content, metadata_json, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![collection, id, content, metadata_json, embedding],
            )
            .context("Failed to insert document")?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        let collection = self.collection.clone();
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HashingEmbedder;
    use serde_json::json;

    fn store(collection: &str) -> SqliteStore {
        SqliteStore::open_memory(collection, Arc::new(HashingEmbedder::default())).unwrap()
    }

    fn doc(id: &str, content: &str) -> Document {
        Document {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn empty_collection_returns_empty_set() {
        let s = store("empty");
        assert!(s.query("anything", 3).await.unwrap().is_empty());
        assert_eq!(s.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_returns_k_in_non_increasing_order() {
        let s = store("kb");
        s.add(&doc("a", "The sky is blue.")).await.unwrap();
        s.add(&doc("b", "Grass grows green in summer.")).await.unwrap();
        s.add(&doc("c", "The sky at night is dark.")).await.unwrap();

        let hits = s.query("What color is the sky?", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.document.id != "b"));
    }

    #[tokio::test]
    async fn metadata_survives_storage() {
        let s = store("kb");
        let mut d = doc("m", "Uniplexity AI builds research agents.");
        d.metadata.insert("source".into(), json!("about.md"));
        d.metadata.insert("page".into(), json!(3));
        s.add(&d).await.unwrap();

        let hits = s.query("What is Uniplexity AI?", 1).await.unwrap();
        assert_eq!(hits[0].document, d);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        let conn = Connection::open_in_memory().unwrap();
        let a = SqliteStore::with_connection(conn, "a", embedder.clone()).unwrap();
        a.add(&doc("1", "only in a")).await.unwrap();

        let b = SqliteStore {
            conn: a.conn.clone(),
            collection: "b".into(),
            embedder,
        };
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query("only in a", 5).await.unwrap().is_empty());
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }
}
