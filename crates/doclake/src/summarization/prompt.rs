//! Prompt templates for summarization

use super::tier::BudgetTier;

/// Prompt builder for summary requests
pub struct SummaryPromptBuilder;

impl SummaryPromptBuilder {
    /// Fixed instruction for each tier
    fn instruction(tier: BudgetTier, budget: usize) -> String {
        match tier {
            BudgetTier::Short => format!(
                "Summarize the following text in one or two sentences, in no more than {} characters.",
                budget
            ),
            BudgetTier::General => format!(
                "Summarize the main points of the following text in no more than {} characters.",
                budget
            ),
            BudgetTier::Detailed => format!(
                "Write a detailed summary of the following text in no more than {} characters. \
                 Cover the key points, any figures or dates, and the conclusions.",
                budget
            ),
        }
    }

    /// Build the summarization prompt
    pub fn build(tier: BudgetTier, budget: usize, text: &str) -> String {
        format!(
            r#"{instruction}
Write the summary in the same language as the text. Output only the summary.

Text:
{text}

Summary:"#,
            instruction = Self::instruction(tier, budget),
            text = text
        )
    }
}
