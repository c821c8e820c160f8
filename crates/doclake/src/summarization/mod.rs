//! Adaptive summarization
//!
//! The summary budget and prompt framing are picked from the input length so
//! cost tracks input size and the same length class always gets the same
//! request.

mod engine;
mod prompt;
mod tier;

pub use engine::{Summary, SummaryPlan, SummarizationEngine};
pub use prompt::SummaryPromptBuilder;
pub use tier::{BudgetTier, TierPolicy};
