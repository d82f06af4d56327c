//! Fixed prompt template for retrieval-augmented answers.

/// Placed between retrieved documents in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Stated in place of the context block when nothing was retrieved.
const NO_DOCUMENTS_NOTICE: &str = "(No documents were retrieved. The knowledge base has no \
information on this question, so say that you do not have enough information rather than \
guessing.)";

/// Join retrieved texts, most relevant first, into one context block.
pub fn context_block(documents: &[String]) -> String {
    documents.join(CONTEXT_SEPARATOR)
}

/// Build the completion prompt for `question` over `documents`.
pub fn build_prompt(question: &str, documents: &[String]) -> String {
    let context = context_block(documents);
    let context = if context.trim().is_empty() {
        NO_DOCUMENTS_NOTICE
    } else {
        context.as_str()
    };

    format!(
        "You are an expert assistant. Use the retrieved documents below to answer the user's question.\n\
         If the documents don't contain enough info, say so and answer with what you can infer.\n\
         \n\
         Retrieved documents:\n\
         {context}\n\
         \n\
         User question:\n\
         {question}\n\
         \n\
         Answer concisely and cite the document snippet you used (by quoting it).\n"
    )
}
