//! Inference provider trait for text completions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling parameters sent with a completion request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl SamplingConfig {
    /// Greedy decoding, used for SQL generation
    pub fn deterministic(max_tokens: u32) -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens,
        }
    }
}

/// Trait for LLM text completion
///
/// Implementations:
/// - `OllamaClient`: Local Ollama server
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Complete a prompt
    async fn complete(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
