//! Knowledge-base tools: `rag_search` and `add_document`.

use super::{optional_u64, required_str, result_schema, Tool};
use crate::error::ToolError;
use crate::rag::{AnswerComposer, RetrievalService};
use crate::types::{DocumentAdded, Metadata, ToolPayload, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct RagSearchTool {
    composer: Arc<AnswerComposer>,
    default_k: usize,
}

impl RagSearchTool {
    pub fn new(composer: Arc<AnswerComposer>, default_k: usize) -> Self {
        Self {
            composer,
            default_k: default_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for RagSearchTool {
    fn name(&self) -> &str {
        "rag_search"
    }

    fn description(&self) -> &str {
        "Answer a question from the internal knowledge base. Retrieves the most relevant \
         stored documents and generates an answer grounded in them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to answer"
                },
                "k": {
                    "type": "integer",
                    "description": format!("Documents to retrieve (default {})", self.default_k)
                }
            },
            "required": ["question"]
        })
    }

    fn output_schema(&self) -> Value {
        result_schema(json!({
            "question": {"type": "string"},
            "retrieved_documents": {"type": "array", "items": {"type": "string"}},
            "answer": {"type": "string", "description": "Answer, or an apology on failure"},
            "num_docs_retrieved": {"type": "integer"}
        }))
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let parsed = required_str(args, "question").and_then(|q| {
            let k = optional_u64(args, "k")?.map_or(self.default_k, |k| k as usize);
            Ok((q, k))
        });

        match parsed {
            Ok((question, k)) => self.composer.respond(question, k).await,
            Err(e) => ToolResult::failure(
                ToolPayload::AnswerFailed {
                    question: String::new(),
                    answer: format!("Sorry, I could not read the request: {}", e),
                },
                e.kind(),
                e.to_string(),
            ),
        }
    }
}

pub struct AddDocumentTool {
    retrieval: RetrievalService,
}

impl AddDocumentTool {
    pub fn new(retrieval: RetrievalService) -> Self {
        Self { retrieval }
    }

    async fn run(&self, args: &Value) -> Result<String> {
        let content = required_str(args, "content")?;
        let metadata = match args.get("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ToolError::InvalidArgument("'metadata' must be an object".into()).into())
            }
        };
        self.retrieval.add(content, metadata).await
    }
}

#[async_trait]
impl Tool for AddDocumentTool {
    fn name(&self) -> &str {
        "add_document"
    }

    fn description(&self) -> &str {
        "Add a document to the knowledge base so later rag_search calls can use it. \
         Metadata values must be strings, numbers or booleans."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Document text"
                },
                "metadata": {
                    "type": "object",
                    "description": "Optional flat key/value metadata",
                    "additionalProperties": {"type": ["string", "number", "boolean"]}
                }
            },
            "required": ["content"]
        })
    }

    fn output_schema(&self) -> Value {
        result_schema(json!({
            "message": {"type": "string"},
            "document_id": {"type": "string", "description": "32 hex characters"}
        }))
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        match self.run(args).await {
            Ok(id) => ToolResult::success(ToolPayload::Added(DocumentAdded {
                message: format!("Document added successfully with ID: {}", id),
                document_id: id,
            })),
            Err(e) => ToolResult::from_error(
                ToolPayload::Message {
                    message: format!("Failed to add document: {:#}", e),
                },
                &e,
            ),
        }
    }
}
