//! Configuration schema for uniplexity.toml.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the local store inside the home directory.
pub const SQLITE_FILE: &str = "knowledge.db";

/// Which vector store backs the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Chroma Cloud (v2 REST API).
    Chroma,
    /// Local SQLite file with on-device embeddings.
    Sqlite,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the vector store collection holding the knowledge base.
    pub collection: String,

    /// Vector store backend.
    pub store_backend: StoreBackend,

    /// Chroma API base URL.
    pub chroma_url: String,

    /// Chroma API key (env: CHROMA_API_KEY).
    pub chroma_api_key: String,

    /// Chroma tenant (env: CHROMA_TENANT).
    pub chroma_tenant: String,

    /// Chroma database (env: CHROMA_DATABASE).
    pub chroma_database: String,

    /// SQLite file used by the local backend. Empty means `knowledge.db`
    /// in the home directory.
    pub sqlite_path: String,

    /// Timeout for every vector store call.
    pub store_timeout_secs: u64,

    /// Generative Language API base URL.
    pub gemini_api_url: String,

    /// Generative Language API key (env: GOOGLE_API_KEY).
    pub google_api_key: String,

    /// Model used to compose retrieval-augmented answers.
    pub rag_model: String,

    /// Model used for embeddings by the Chroma backend.
    pub embedding_model: String,

    /// Output ceiling for the answer composer.
    pub max_output_tokens: u32,

    /// Timeout for completion and embedding calls.
    pub completion_timeout_secs: u64,

    /// Documents retrieved when the caller gives no `k`.
    pub default_k: usize,

    /// Custom Search JSON API endpoint.
    pub search_api_url: String,

    /// Custom Search API key (env: GOOGLE_CSE_API_KEY).
    pub search_api_key: String,

    /// Custom Search engine id (env: GOOGLE_CSE_ID).
    pub search_engine_id: String,

    /// Provider per-call maximum; larger requests are clamped.
    pub max_search_results: u32,

    pub search_timeout_secs: u64,

    pub scrape_timeout_secs: u64,

    /// Scraped text is cut to this many characters.
    pub scrape_max_chars: usize,

    pub scrape_user_agent: String,

    /// Whether the conversation agent may delegate to the RAG agent.
    pub rag_enabled: bool,

    /// Model driving the agent graph.
    pub agent_model: String,

    /// OpenAI-compatible chat completions base URL for the agent graph.
    pub agent_api_url: String,

    /// Upper bound on inference rounds per `ask`.
    pub max_turns: u32,

    /// Maximum tool calls executed from a single model reply.
    pub max_tool_calls_per_turn: u32,

    /// Output ceiling for each agent inference round.
    pub max_tokens_per_turn: u32,

    /// Optional YAML file replacing the built-in agent graph.
    pub agents_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collection: "uniplexity_collection".into(),
            store_backend: StoreBackend::Chroma,
            chroma_url: "https://api.trychroma.com".into(),
            chroma_api_key: String::new(),
            chroma_tenant: String::new(),
            chroma_database: String::new(),
            sqlite_path: String::new(),
            store_timeout_secs: 30,
            gemini_api_url: "https://generativelanguage.googleapis.com".into(),
            google_api_key: String::new(),
            rag_model: "gemini-2.5-flash".into(),
            embedding_model: "text-embedding-004".into(),
            max_output_tokens: 512,
            completion_timeout_secs: 60,
            default_k: 1,
            search_api_url: "https://www.googleapis.com/customsearch/v1".into(),
            search_api_key: String::new(),
            search_engine_id: String::new(),
            max_search_results: 10,
            search_timeout_secs: 15,
            scrape_timeout_secs: 10,
            scrape_max_chars: 2000,
            scrape_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .into(),
            rag_enabled: true,
            agent_model: "gemini-2.0-flash".into(),
            agent_api_url: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
            max_turns: 8,
            max_tool_calls_per_turn: 5,
            max_tokens_per_turn: 1024,
            agents_path: String::new(),
            log_level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Fill the home-relative defaults of paths left empty.
    pub fn with_home(mut self, home: &Path) -> Self {
        if self.sqlite_path.is_empty() {
            self.sqlite_path = home.join(SQLITE_FILE).to_string_lossy().into_owned();
        }
        self
    }

    /// Resolved SQLite store path.
    pub fn resolved_sqlite_path(&self) -> String {
        if self.sqlite_path.is_empty() {
            return super::default_home_dir()
                .join(SQLITE_FILE)
                .to_string_lossy()
                .into_owned();
        }
        self.resolve_path(&self.sqlite_path)
    }

    /// Resolved agent graph path, if one is configured.
    pub fn resolved_agents_path(&self) -> Option<String> {
        if self.agents_path.is_empty() {
            None
        } else {
            Some(self.resolve_path(&self.agents_path))
        }
    }

    pub fn has_search_credentials(&self) -> bool {
        !self.search_api_key.is_empty() && !self.search_engine_id.is_empty()
    }

    pub fn has_chroma_credentials(&self) -> bool {
        !self.chroma_api_key.is_empty()
            && !self.chroma_tenant.is_empty()
            && !self.chroma_database.is_empty()
    }

    pub fn has_google_api_key(&self) -> bool {
        !self.google_api_key.is_empty()
    }
}
