//! Retrieval-augmented answering over the knowledge base.
//!
//! [`RetrievalService`] owns the store handle; [`AnswerComposer`] turns a
//! question plus retrieved documents into a grounded completion.

pub mod composer;
pub mod prompt;
pub mod retrieval;

pub use composer::{AnswerComposer, ComposedAnswer};
pub use retrieval::{document_id, RetrievalService};
