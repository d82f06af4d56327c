//! Answer composer: retrieve, prompt, complete, extract.

use super::prompt::build_prompt;
use super::retrieval::RetrievalService;
use crate::llm::{extract_text, Completion};
use crate::types::{RagAnswer, RetrievedSet, ToolPayload, ToolResult};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a successful retrieval-augmented completion.
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub retrieved: RetrievedSet,
    pub answer: String,
}

impl ComposedAnswer {
    pub fn retrieved_texts(&self) -> Vec<String> {
        self.retrieved
            .iter()
            .map(|d| d.document.content.clone())
            .collect()
    }
}

pub struct AnswerComposer {
    retrieval: RetrievalService,
    completion: Arc<dyn Completion>,
    max_output_tokens: u32,
}

impl AnswerComposer {
    pub fn new(
        retrieval: RetrievalService,
        completion: Arc<dyn Completion>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            retrieval,
            completion,
            max_output_tokens: max_output_tokens.max(1),
        }
    }

    /// Answer `question` grounded in the `k` most relevant documents.
    pub async fn answer(&self, question: &str, k: usize) -> Result<ComposedAnswer> {
        let retrieved = self.retrieval.query(question, k).await?;
        let texts: Vec<String> = retrieved
            .iter()
            .map(|d| d.document.content.clone())
            .collect();

        let prompt = build_prompt(question, &texts);
        let raw_response = self
            .completion
            .generate(&prompt, self.max_output_tokens)
            .await
            .context("Completion call failed")?;

        let mut answer = extract_text(&raw_response);
        if answer.trim().is_empty() {
            debug!("Completion carried no text: {}", raw_response);
            answer = format!(
                "I don't have enough information in the knowledge base to answer '{}'.",
                question
            );
        }

        Ok(ComposedAnswer { retrieved, answer })
    }

    /// Tool-boundary form of [`answer`](Self::answer): never fails, and
    /// always carries a displayable `answer`.
    pub async fn respond(&self, question: &str, k: usize) -> ToolResult {
        match self.answer(question, k).await {
            Ok(composed) => {
                let retrieved_documents = composed.retrieved_texts();
                info!(
                    "Answered '{}' from {} documents",
                    question,
                    retrieved_documents.len()
                );
                ToolResult::success(ToolPayload::Answer(RagAnswer {
                    question: question.to_string(),
                    doc_count: retrieved_documents.len(),
                    retrieved_documents,
                    answer: composed.answer,
                }))
            }
            Err(e) => {
                warn!("RAG answer for '{}' failed: {:#}", question, e);
                ToolResult::from_error(
                    ToolPayload::AnswerFailed {
                        question: question.to_string(),
                        answer: apology(question, &e),
                    },
                    &e,
                )
            }
        }
    }
}

fn apology(question: &str, err: &anyhow::Error) -> String {
    format!(
        "Sorry, I encountered an error while searching for information about '{}': {:#}",
        question, err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::UnavailableCompletion;
    use crate::store::{HashingEmbedder, SqliteStore};
    use crate::types::{Metadata, ToolStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Answers with the first retrieved line of the prompt, recording what it saw.
    #[derive(Default)]
    struct QuotingCompletion {
        seen: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl Completion for QuotingCompletion {
        async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), max_output_tokens));
            let context = prompt
                .split("Retrieved documents:\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            Ok(json!({
                "candidates": [{"content": {"parts": [{"text": format!("According to \"{}\"", context)}]}}]
            }))
        }
    }

    struct BlankCompletion;

    #[async_trait]
    impl Completion for BlankCompletion {
        async fn generate(&self, _prompt: &str, _max: u32) -> Result<Value> {
            Ok(json!({"text": "   "}))
        }
    }

    fn retrieval() -> RetrievalService {
        let store =
            SqliteStore::open_memory("kb", Arc::new(HashingEmbedder::default())).unwrap();
        RetrievalService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn grounded_answer_for_stored_fact() {
        let retrieval = retrieval();
        let id = retrieval
            .add("The sky is blue.", Metadata::new())
            .await
            .unwrap();
        assert_eq!(id.len(), 32);

        let completion = Arc::new(QuotingCompletion::default());
        let composer = AnswerComposer::new(retrieval, completion.clone(), 512);
        let result = composer.respond("What color is the sky?", 1).await;

        assert_eq!(result.status, ToolStatus::Success);
        let ToolPayload::Answer(answer) = &result.payload else {
            panic!("unexpected payload: {:?}", result.payload);
        };
        assert_eq!(answer.doc_count, 1);
        assert_eq!(answer.retrieved_documents[0], "The sky is blue.");
        assert!(answer.answer.contains("blue"));

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen[0].1, 512);
        assert!(seen[0].0.contains("The sky is blue."));
    }

    #[tokio::test]
    async fn empty_store_still_succeeds_without_claiming_grounding() {
        let completion = Arc::new(QuotingCompletion::default());
        let composer = AnswerComposer::new(retrieval(), completion.clone(), 64);
        let result = composer.respond("Who won the match?", 3).await;

        assert!(result.is_success());
        let json = result.to_json();
        assert_eq!(json["num_docs_retrieved"], 0);
        assert!(!json["answer"].as_str().unwrap().is_empty());
        assert!(completion.seen.lock().unwrap()[0]
            .0
            .contains("No documents were retrieved"));
    }

    #[tokio::test]
    async fn blank_completion_falls_back_to_insufficient_information() {
        let composer = AnswerComposer::new(retrieval(), Arc::new(BlankCompletion), 64);
        let composed = composer.answer("Anything?", 1).await.unwrap();
        assert!(composed.answer.contains("don't have enough information"));
    }

    #[tokio::test]
    async fn completion_failure_yields_apology() {
        let composer = AnswerComposer::new(
            retrieval(),
            Arc::new(UnavailableCompletion::new("GOOGLE_API_KEY is not set")),
            64,
        );
        let result = composer.respond("What is Uniplexity AI?", 1).await;

        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.error_detail.as_deref().unwrap().contains("GOOGLE_API_KEY"));
        let json = result.to_json();
        assert_eq!(json["error_kind"], "configuration_missing");
        assert!(json["answer"]
            .as_str()
            .unwrap()
            .starts_with("Sorry, I encountered an error while searching for information about 'What is Uniplexity AI?'"));
    }
}
