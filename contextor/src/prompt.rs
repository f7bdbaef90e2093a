//! Prompt builder shared by the single-shot and streaming paths.

use rag_store::Chunk;

/// Instructions placed above the question.
pub const INSTRUCTIONS: &str = "\
You are a technical documentation assistant.
Answer the question using only the retrieved context below.
If the context does not contain the answer, say that you don't know.
Format any code in fenced blocks tagged with its language name.";

/// Renders the grounding prompt.
///
/// Context blocks keep retrieval order and are headed `[n] source`. With no
/// documents the context section says so, and the instructions above tell the
/// model to admit it does not know.
///
/// # Example
/// ```
/// # use contextor::prompt::render;
/// let prompt = render("How do I chunk?", &[]);
/// assert!(prompt.contains("Question:\nHow do I chunk?"));
/// ```
pub fn render(question: &str, documents: &[Chunk]) -> String {
    let mut out = String::with_capacity(
        INSTRUCTIONS.len() + question.len() + documents.iter().map(|d| d.text.len() + 32).sum::<usize>(),
    );
    out.push_str(INSTRUCTIONS);
    out.push_str("\n\nQuestion:\n");
    out.push_str(question.trim());
    out.push_str("\n\nContext:\n");

    if documents.is_empty() {
        out.push_str("(no documents retrieved)\n");
    }
    for (i, doc) in documents.iter().enumerate() {
        out.push_str(&format!("[{}] {}\n", i + 1, doc.source()));
        out.push_str(doc.text.trim());
        out.push_str("\n\n");
    }

    out.push_str("\nAnswer:\n");
    out
}
