//! Service handles, built once at startup and passed down explicitly.

use crate::agent::{AgentGraph, AgentRunner, RunLimits};
use crate::config::{AppConfig, StoreBackend};
use crate::llm::{ChatClient, ChatModel, Completion, Embedder, GeminiClient, UnavailableCompletion};
use crate::rag::{AnswerComposer, RetrievalService};
use crate::store::chroma::ChromaSettings;
use crate::store::{ChromaStore, HashingEmbedder, SqliteStore, UnavailableStore, VectorStore};
use crate::tools::{
    AddDocumentTool, GoogleSearchTool, RagSearchTool, ScrapeSettings, SearchSettings,
    ToolRegistry, WeatherTool, WebScrapeTool,
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the tools and the agent runner need. Dropping it releases
/// all connections; nothing runs in the background.
pub struct Services {
    pub config: AppConfig,
    pub retrieval: RetrievalService,
    pub tools: ToolRegistry,
    pub chat: Arc<dyn ChatModel>,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let completion_timeout = Duration::from_secs(config.completion_timeout_secs);

        let gemini = if config.has_google_api_key() {
            Some(Arc::new(GeminiClient::new(
                &config.gemini_api_url,
                &config.google_api_key,
                &config.rag_model,
                &config.embedding_model,
                completion_timeout,
            )?))
        } else {
            warn!("GOOGLE_API_KEY is not set; answer composition and embeddings are unavailable");
            None
        };

        let completion: Arc<dyn Completion> = match &gemini {
            Some(client) => client.clone(),
            None => Arc::new(UnavailableCompletion::new("GOOGLE_API_KEY is not set")),
        };
        let embedder: Arc<dyn Embedder> = match &gemini {
            Some(client) => client.clone(),
            None => Arc::new(UnavailableCompletion::new("GOOGLE_API_KEY is not set")),
        };

        let store = build_store(config, embedder)?;
        let retrieval = RetrievalService::new(store);
        let composer = Arc::new(AnswerComposer::new(
            retrieval.clone(),
            completion,
            config.max_output_tokens,
        ));

        if !config.has_search_credentials() {
            warn!("GOOGLE_CSE_API_KEY or GOOGLE_CSE_ID is not set; web search is unavailable");
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(GoogleSearchTool::new(SearchSettings {
            api_url: config.search_api_url.clone(),
            api_key: config.search_api_key.clone(),
            engine_id: config.search_engine_id.clone(),
            max_results: config.max_search_results,
            timeout: Duration::from_secs(config.search_timeout_secs),
        })?));
        tools.register(Arc::new(WebScrapeTool::new(ScrapeSettings {
            timeout: Duration::from_secs(config.scrape_timeout_secs),
            max_chars: config.scrape_max_chars,
            user_agent: config.scrape_user_agent.clone(),
        })?));
        tools.register(Arc::new(RagSearchTool::new(composer, config.default_k)));
        tools.register(Arc::new(AddDocumentTool::new(retrieval.clone())));
        tools.register(Arc::new(WeatherTool::new()));

        let chat: Arc<dyn ChatModel> = Arc::new(ChatClient::new(
            &config.agent_api_url,
            &config.google_api_key,
            completion_timeout,
        )?);

        info!(
            "Services ready: {} tools, collection '{}'",
            tools.definitions().len(),
            retrieval.collection()
        );

        Ok(Self {
            config: config.clone(),
            retrieval,
            tools,
            chat,
        })
    }

    /// The configured agent graph (YAML when `agents_path` is set), checked
    /// against the tool registry.
    pub fn agent_graph(&self) -> Result<AgentGraph> {
        let graph = match self.config.resolved_agents_path() {
            Some(path) => AgentGraph::load(Path::new(&path), &self.config.agent_model)?,
            None => AgentGraph::default_for(&self.config),
        };
        graph
            .validate(&self.tools)
            .context("Agent graph does not match the registered tools")?;
        Ok(graph)
    }

    pub fn runner(&self) -> Result<AgentRunner> {
        Ok(AgentRunner::new(
            Arc::new(self.agent_graph()?),
            self.tools.clone(),
            self.chat.clone(),
            RunLimits::from_config(&self.config),
        ))
    }
}

fn build_store(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Arc<dyn VectorStore>> {
    match config.store_backend {
        StoreBackend::Chroma if !config.has_chroma_credentials() => {
            warn!("Chroma credentials are incomplete; the knowledge base is unavailable");
            Ok(Arc::new(UnavailableStore::new(
                &config.collection,
                "CHROMA_API_KEY, CHROMA_TENANT and CHROMA_DATABASE must be set",
            )))
        }
        StoreBackend::Chroma => {
            let settings = ChromaSettings {
                base_url: config.chroma_url.clone(),
                api_key: config.chroma_api_key.clone(),
                tenant: config.chroma_tenant.clone(),
                database: config.chroma_database.clone(),
                timeout: Duration::from_secs(config.store_timeout_secs),
            };
            Ok(Arc::new(ChromaStore::new(settings, &config.collection, embedder)?))
        }
        StoreBackend::Sqlite => {
            let path = config.resolved_sqlite_path();
            let store = SqliteStore::open(
                Path::new(&path),
                &config.collection,
                Arc::new(HashingEmbedder::default()),
            )
            .with_context(|| format!("Failed to open document store at {}", path))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn sqlite_config() -> AppConfig {
        let path = std::env::temp_dir().join(format!("uniplexity-{}.db", ulid::Ulid::new()));
        AppConfig {
            store_backend: StoreBackend::Sqlite,
            sqlite_path: path.to_string_lossy().into_owned(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn builds_without_any_credentials() {
        let services = Services::from_config(&AppConfig::default()).unwrap();
        let names: Vec<&str> = services.tools.names().collect();
        assert_eq!(
            names,
            vec!["add_document", "get_weather", "google_search", "rag_search", "web_scrape"]
        );
        services.agent_graph().unwrap();
    }

    #[tokio::test]
    async fn missing_credentials_surface_as_tool_errors() {
        let services = Services::from_config(&AppConfig::default()).unwrap();

        let search = services
            .tools
            .execute("google_search", &json!({"query": "rust"}))
            .await;
        assert_eq!(search.error_kind, Some(ErrorKind::ConfigurationMissing));

        let add = services
            .tools
            .execute("add_document", &json!({"content": "The sky is blue."}))
            .await;
        assert_eq!(add.error_kind, Some(ErrorKind::ConfigurationMissing));
    }

    #[tokio::test]
    async fn local_store_accepts_documents_without_a_model_key() {
        let config = sqlite_config();
        let services = Services::from_config(&config).unwrap();

        let added = services
            .tools
            .execute("add_document", &json!({"content": "The sky is blue."}))
            .await;
        assert!(added.is_success());
        assert_eq!(services.retrieval.count().await.unwrap(), 1);

        // Retrieval works, composition reports the missing key with an apology.
        let answer = services
            .tools
            .execute("rag_search", &json!({"question": "What color is the sky?"}))
            .await
            .to_json();
        assert_eq!(answer["status"], "error");
        assert_eq!(answer["error_kind"], "configuration_missing");
        assert!(answer["answer"].as_str().unwrap().starts_with("Sorry"));

        drop(services);
        let _ = std::fs::remove_file(config.resolved_sqlite_path());
    }

    #[test]
    fn yaml_graph_with_unknown_tool_is_rejected() {
        let path = std::env::temp_dir().join(format!("uniplexity-agents-{}.yaml", ulid::Ulid::new()));
        std::fs::write(&path, "root: a\nagents:\n  - name: a\n    tools: [teleport]\n").unwrap();

        let config = AppConfig {
            agents_path: path.to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let services = Services::from_config(&config).unwrap();
        assert!(services.agent_graph().is_err());

        let _ = std::fs::remove_file(path);
    }
}
