//! Context-window budgeting for retrieved passages.
//!
//! A language model only accepts a bounded prompt. Before the retrieved
//! passages are placed into the prompt, this module works out how many words
//! of context fit next to the tokens reserved for the answer, splits that
//! allowance evenly across the passages, and truncates each passage on word
//! boundaries.
//!
//! Word counts stand in for tokens through a fixed ratio
//! ([`DEFAULT_TOKENS_PER_WORD`]), which is close enough for English prose and
//! avoids shipping a tokenizer.
//!
//! # Example
//!
//! ```
//! use ragdoc_context::budget::ContextBudgeter;
//!
//! let budgeter = ContextBudgeter::from_word_budget(300);
//! assert_eq!(budgeter.per_passage(3), 100);
//!
//! let long = vec!["word"; 150].join(" ");
//! let short = vec!["word"; 50].join(" ");
//! let fitted = budgeter.fit_passages(&[long, short.clone(), short.clone()]);
//! assert_eq!(fitted[0].split_whitespace().count(), 100);
//! assert!(fitted[0].ends_with("..."));
//! assert_eq!(fitted[1], short);
//! ```

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Approximate number of model tokens per English word.
pub const DEFAULT_TOKENS_PER_WORD: f64 = 1.3;

/// Appended to a passage that lost words to truncation.
pub const TRUNCATION_MARKER: &str = "...";

/// Computes the word allowance for prompt context and truncates passages to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBudgeter {
    max_context_words: usize,
}

impl ContextBudgeter {
    /// Budget for a model with `context_window_tokens` of which
    /// `reserved_for_answer` tokens are kept free for generation.
    ///
    /// `max_context_words = (context_window_tokens - reserved_for_answer) / tokens_per_word`,
    /// floored, and 0 when the reservation exceeds the window.
    pub fn new(
        context_window_tokens: usize,
        reserved_for_answer: usize,
        tokens_per_word: f64,
    ) -> Self {
        let available = context_window_tokens.saturating_sub(reserved_for_answer);
        let max_context_words = if tokens_per_word > 0.0 {
            // the epsilon keeps exact quotients like 390 / 1.3 from flooring to 299
            (available as f64 / tokens_per_word + 1e-9).floor() as usize
        } else {
            available
        };
        Self { max_context_words }
    }

    /// Budget with an explicit total word allowance.
    pub fn from_word_budget(max_context_words: usize) -> Self {
        Self { max_context_words }
    }

    /// Total words of context that fit in the prompt.
    pub fn max_context_words(&self) -> usize {
        self.max_context_words
    }

    /// Words each of `passage_count` passages may keep. Returns 0 for no passages.
    pub fn per_passage(&self, passage_count: usize) -> usize {
        if passage_count == 0 {
            return 0;
        }
        self.max_context_words / passage_count
    }

    /// Truncate every passage to the per-passage allowance, preserving order.
    pub fn fit_passages<S: AsRef<str>>(&self, passages: &[S]) -> Vec<String> {
        let per_passage = self.per_passage(passages.len());
        passages
            .iter()
            .map(|passage| truncate(passage.as_ref(), per_passage))
            .collect()
    }
}

/// Keep at most `max_words` whitespace-separated words of `text`.
///
/// Text within the limit is returned unchanged. Longer text is cut to its
/// first `max_words` words, re-joined with single spaces, followed by
/// [`TRUNCATION_MARKER`]. Words are never split.
pub fn truncate(text: &str, max_words: usize) -> String {
    let word_count = text.split_whitespace().count();
    if word_count <= max_words {
        return text.to_string();
    }

    let mut truncated = text.split_whitespace().take(max_words).join(" ");
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
