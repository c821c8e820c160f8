//! Summarization engine

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SummarizationConfig;
use crate::error::{Error, Result};
use crate::providers::{InferenceProvider, SamplingConfig};

use super::prompt::SummaryPromptBuilder;
use super::tier::{BudgetTier, TierPolicy};

/// Fixed summary sampling
pub const SUMMARY_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_TOP_P: f32 = 0.9;

/// A generated summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub budget_tier: BudgetTier,
    pub model_used: String,
}

/// Tier, budget and prompt chosen for an input, before any inference call
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPlan {
    pub tier: BudgetTier,
    pub budget: usize,
    /// Input length in characters, before truncation
    pub input_chars: usize,
    pub truncated: bool,
    pub prompt: String,
}

/// Produces length-adaptive summaries through an inference provider
pub struct SummarizationEngine {
    inference: Arc<dyn InferenceProvider>,
    policy: TierPolicy,
    sampling: SamplingConfig,
    max_input_chars: usize,
}

impl SummarizationEngine {
    pub fn new(inference: Arc<dyn InferenceProvider>, config: &SummarizationConfig) -> Self {
        Self {
            inference,
            policy: TierPolicy::from_config(config),
            sampling: SamplingConfig {
                temperature: SUMMARY_TEMPERATURE,
                top_p: SUMMARY_TOP_P,
                max_tokens: config.max_tokens,
            },
            max_input_chars: config.max_input_chars,
        }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Model name reported by the provider
    pub fn model(&self) -> &str {
        self.inference.model()
    }

    /// Pick the tier and build the prompt
    ///
    /// The tier depends on the full input length; only the prompted text is
    /// truncated.
    pub fn plan(&self, text: &str) -> SummaryPlan {
        let input_chars = text.chars().count();
        let tier = self.policy.tier_for_len(input_chars);
        let budget = self.policy.budget(tier);

        let (body, truncated) = match text.char_indices().nth(self.max_input_chars) {
            Some((end, _)) => (&text[..end], true),
            None => (text, false),
        };

        SummaryPlan {
            tier,
            budget,
            input_chars,
            truncated,
            prompt: SummaryPromptBuilder::build(tier, budget, body),
        }
    }

    /// Summarize text
    pub async fn summarize(&self, text: &str) -> Result<Summary> {
        let plan = self.plan(text);

        tracing::debug!(
            tier = %plan.tier,
            budget = plan.budget,
            input_chars = plan.input_chars,
            truncated = plan.truncated,
            provider = self.inference.name(),
            "Summarizing"
        );

        let completion = self.inference.complete(&plan.prompt, &self.sampling).await?;
        let summary = completion.trim();
        if summary.is_empty() {
            return Err(Error::inference(format!(
                "{} returned an empty summary",
                self.inference.name()
            )));
        }

        Ok(Summary {
            summary: summary.to_string(),
            budget_tier: plan.tier,
            model_used: self.inference.model().to_string(),
        })
    }
}
