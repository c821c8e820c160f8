//! Summary budget tiers
//!
//! Classifies input text into tiers by character count for adaptive summary
//! length.

use serde::{Deserialize, Serialize};

use crate::config::SummarizationConfig;

/// Summary tier based on input size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    /// Small inputs: one or two sentence gist
    Short,
    /// Medium inputs: main points
    General,
    /// Large inputs: key points, figures and conclusions
    Detailed,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetTier::Short => "short",
            BudgetTier::General => "general",
            BudgetTier::Detailed => "detailed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short" => Some(BudgetTier::Short),
            "general" => Some(BudgetTier::General),
            "detailed" => Some(BudgetTier::Detailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and budgets for tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// Inputs below this many chars are short
    pub short_max_chars: usize,
    /// Inputs below this many chars are general
    pub general_max_chars: usize,
    pub short_budget: usize,
    pub general_budget: usize,
    pub detailed_budget: usize,
}

impl TierPolicy {
    pub fn from_config(config: &SummarizationConfig) -> Self {
        Self {
            short_max_chars: config.short_max_chars,
            general_max_chars: config.general_max_chars,
            short_budget: config.short_budget,
            general_budget: config.general_budget,
            detailed_budget: config.detailed_budget,
        }
    }

    /// Classify an input by its length in characters
    pub fn tier_for_len(&self, chars: usize) -> BudgetTier {
        if chars < self.short_max_chars {
            BudgetTier::Short
        } else if chars < self.general_max_chars {
            BudgetTier::General
        } else {
            BudgetTier::Detailed
        }
    }

    /// Target summary length in characters
    pub fn budget(&self, tier: BudgetTier) -> usize {
        match tier {
            BudgetTier::Short => self.short_budget,
            BudgetTier::General => self.general_budget,
            BudgetTier::Detailed => self.detailed_budget,
        }
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::from_config(&SummarizationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_len() {
        let policy = TierPolicy::default();
        assert_eq!(policy.tier_for_len(0), BudgetTier::Short);
        assert_eq!(policy.tier_for_len(80), BudgetTier::Short);
        assert_eq!(policy.tier_for_len(999), BudgetTier::Short);
        assert_eq!(policy.tier_for_len(1_000), BudgetTier::General);
        assert_eq!(policy.tier_for_len(4_999), BudgetTier::General);
        assert_eq!(policy.tier_for_len(5_000), BudgetTier::Detailed);
        assert_eq!(policy.tier_for_len(1_000_000), BudgetTier::Detailed);
    }

    #[test]
    fn test_budgets() {
        let policy = TierPolicy::default();
        assert_eq!(policy.budget(BudgetTier::Short), 100);
        assert_eq!(policy.budget(BudgetTier::General), 200);
        assert_eq!(policy.budget(BudgetTier::Detailed), 400);
    }

    #[test]
    fn test_tier_str_round_trip() {
        for tier in [BudgetTier::Short, BudgetTier::General, BudgetTier::Detailed] {
            assert_eq!(BudgetTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(BudgetTier::parse("huge"), None);
    }
}
