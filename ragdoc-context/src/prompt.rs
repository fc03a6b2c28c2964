//! Prompt assembly from budgeted passages.
//!
//! Passages are labelled `Passage 1`, `Passage 2`, ... in retrieval-rank order
//! and joined into a single context block, which is embedded together with the
//! raw question into the user prompt sent to the completion model.

use crate::budget::ContextBudgeter;
use itertools::Itertools;
use serde::Serialize;

/// System instructions for a retrieval-augmented assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a retrieval-augmented assistant.

Answer using ONLY the information in the provided context passages.
Do not rely on prior knowledge.
Give short, direct, factual answers.

When answering, name the title of every document you used.

If the answer is not explicitly present in the context, respond exactly with:
\"The provided context does not contain enough information. Can I help you with something else?\"
Do not add any other text.";

/// Label passages 1-based in the given order and join them with blank lines.
pub fn build_context_block<S: AsRef<str>>(passages: &[S]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("Passage {}: {}", i + 1, passage.as_ref()))
        .join("\n\n")
}

/// Build the user prompt around a context block and the question as asked.
pub fn build_prompt(context_block: &str, question: &str) -> String {
    format!(
        "Based on the following information, please answer the question.\n\n\
         Context:\n{context_block}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// A prompt together with the budget that shaped it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPrompt {
    pub prompt: String,
    pub max_context_words: usize,
    pub words_per_passage: usize,
    pub passages: Vec<String>,
}

/// Truncate `passages` with `budgeter`, label them, and wrap them into a prompt.
pub fn assemble<S: AsRef<str>>(
    budgeter: &ContextBudgeter,
    passages: &[S],
    question: &str,
) -> AssembledPrompt {
    let fitted = budgeter.fit_passages(passages);
    let context_block = build_context_block(&fitted);
    AssembledPrompt {
        prompt: build_prompt(&context_block, question),
        max_context_words: budgeter.max_context_words(),
        words_per_passage: budgeter.per_passage(passages.len()),
        passages: fitted,
    }
}
