//! # ragdoc-context
//!
//! Turns retrieved passages into a prompt that fits a model's context window.
//!
//! - [`budget`]: word budget computation and whole-word truncation
//! - [`prompt`]: passage labelling and prompt assembly

pub mod budget;
pub mod prompt;

pub use budget::{ContextBudgeter, DEFAULT_TOKENS_PER_WORD, TRUNCATION_MARKER, truncate};
pub use prompt::{
    AssembledPrompt, DEFAULT_SYSTEM_PROMPT, assemble, build_context_block, build_prompt,
};
