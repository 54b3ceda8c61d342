//! Answer generation.
//!
//! One model call per question: a fixed behavioral directive, the assembled
//! context, and the question. Failures never escape; they become an
//! apologetic message the user can read.

use crate::llm::{extract_text, ChatMessage, LanguageModel};

/// Returned when the model answers with no text.
pub const EMPTY_ANSWER_FALLBACK: &str =
    "I wasn't able to generate an answer for that question. Please try rephrasing it.";

/// Returned when the model call itself fails. The cause goes to the log only.
pub const MODEL_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while generating the answer. Please try again in a moment.";

pub const ANSWER_DIRECTIVE: &str = "You are a guide to a GitHub repository. \
Answer only from the repository information provided below. \
Never invent code, file contents, issues, or pull requests that are not shown. \
When you mention an issue or pull request, always link it with the exact URL provided, \
for example [#12](https://github.com/owner/repo/issues/12). \
If the provided information is not enough to answer, say what is missing. \
Keep answers compact: short paragraphs and bullet lists, no filler.";

/// Compose the messages for the final answer call.
pub fn answer_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANSWER_DIRECTIVE),
        ChatMessage::user(format!(
            "Repository information:\n\n{}\n\n---\n\nQuestion: {}",
            context, question
        )),
    ]
}

/// Generate the answer text. Never fails.
pub async fn generate_answer(
    model: &dyn LanguageModel,
    context: &str,
    question: &str,
    max_tokens: u32,
) -> String {
    let messages = answer_messages(context, question);
    match model.generate(&messages, max_tokens).await {
        Ok(raw) => extract_text(&raw).unwrap_or_else(|| {
            tracing::warn!(model = model.model_name(), "model returned no answer text");
            EMPTY_ANSWER_FALLBACK.to_string()
        }),
        Err(e) => {
            tracing::warn!(model = model.model_name(), error = %e, "answer generation failed");
            MODEL_FAILURE_MESSAGE.to_string()
        }
    }
}
