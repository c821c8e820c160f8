//! Query router
//!
//! Curated templates are tried first, in declaration order. Only when none
//! matches is a statement generated by the inference service.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::providers::{InferenceProvider, SamplingConfig};
use crate::types::{ExecutableQuery, QueryOrigin};

use super::guardrail::GuardrailViolation;
use super::prompt::QueryPromptBuilder;
use super::template::{default_templates, QueryTemplate};
use super::time_range::TimeResolver;

/// Trailing characters dropped before matching
const TRAILING_PUNCTUATION: &[char] = &['?', '.', '!', '。', '？', '！'];

/// Candidate statement produced by the inference service
///
/// Never persisted; it becomes an [`ExecutableQuery`] with GENERATED origin.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub natural_language_input: String,
    pub candidate_statement: String,
    /// Guardrail verdict, once validated
    pub validation_result: Option<std::result::Result<(), GuardrailViolation>>,
}

impl GeneratedQuery {
    /// Extract the statement from a raw completion
    pub fn from_completion(input: &str, completion: &str) -> Self {
        Self {
            natural_language_input: input.to_string(),
            candidate_statement: strip_fences(completion),
            validation_result: None,
        }
    }

    /// Rebuild from a routed query together with its verdict
    pub fn validated(
        query: &ExecutableQuery,
        verdict: std::result::Result<(), GuardrailViolation>,
    ) -> Self {
        Self {
            natural_language_input: query.natural_language_input.clone(),
            candidate_statement: query.statement.clone(),
            validation_result: Some(verdict),
        }
    }

    /// Write the audit line for this query
    pub fn audit(&self) {
        match &self.validation_result {
            None => tracing::info!(
                target: "doclake::audit",
                input = %self.natural_language_input,
                statement = %self.candidate_statement,
                "Generated query"
            ),
            Some(Ok(())) => tracing::info!(
                target: "doclake::audit",
                input = %self.natural_language_input,
                statement = %self.candidate_statement,
                "Generated query approved"
            ),
            Some(Err(violation)) => tracing::warn!(
                target: "doclake::audit",
                input = %self.natural_language_input,
                statement = %self.candidate_statement,
                violation = %violation,
                "Generated query rejected"
            ),
        }
    }

    pub fn into_executable(self, now: DateTime<Utc>) -> ExecutableQuery {
        ExecutableQuery {
            origin: QueryOrigin::Generated,
            natural_language_input: self.natural_language_input,
            statement: self.candidate_statement,
            parameters: Vec::new(),
            allowed_output_columns: Vec::new(),
            routed_at: now,
        }
    }
}

/// Remove markdown fences and a leading "SQL:" label
fn strip_fences(completion: &str) -> String {
    let mut text = completion.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("sql") on the opening fence line
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }

    let text = text.trim();
    let text = text
        .strip_prefix("SQL:")
        .or_else(|| text.strip_prefix("sql:"))
        .unwrap_or(text);
    text.trim().to_string()
}

/// Routes natural-language requests to executable queries
pub struct QueryRouter {
    templates: Vec<QueryTemplate>,
    inference: Arc<dyn InferenceProvider>,
    resolver: TimeResolver,
    sampling: SamplingConfig,
}

impl QueryRouter {
    pub fn new(
        templates: Vec<QueryTemplate>,
        inference: Arc<dyn InferenceProvider>,
        resolver: TimeResolver,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            templates,
            inference,
            resolver,
            sampling,
        }
    }

    /// Build from configuration, falling back to the built-in templates
    pub fn from_config(config: &AppConfig, inference: Arc<dyn InferenceProvider>) -> Result<Self> {
        let defs = config.templates.clone().unwrap_or_else(default_templates);
        let templates = defs
            .into_iter()
            .map(QueryTemplate::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(
            templates,
            inference,
            TimeResolver::from_config(&config.query)?,
            SamplingConfig::deterministic(config.query.generation_max_tokens),
        ))
    }

    pub fn templates(&self) -> &[QueryTemplate] {
        &self.templates
    }

    /// Collapse whitespace and drop trailing punctuation
    pub fn normalize(input: &str) -> String {
        let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim_end_matches(TRAILING_PUNCTUATION).trim_end().to_string()
    }

    /// First matching template, if any
    pub fn match_template(
        &self,
        input: &str,
        now: DateTime<Utc>,
    ) -> Option<Result<ExecutableQuery>> {
        let normalized = Self::normalize(input);

        self.templates.iter().find_map(|template| {
            let bound = template.try_match(&normalized, &self.resolver, now)?;
            Some(bound.map(|parameters| ExecutableQuery {
                origin: QueryOrigin::Template {
                    template_id: template.id().to_string(),
                },
                natural_language_input: input.to_string(),
                statement: template.statement().to_string(),
                parameters,
                allowed_output_columns: template.allowed_output_columns().to_vec(),
                routed_at: now,
            }))
        })
    }

    /// Route a request
    ///
    /// A matched template with an invalid parameter is an error; it does not
    /// fall through to generation.
    pub async fn route(&self, input: &str, now: DateTime<Utc>) -> Result<ExecutableQuery> {
        if input.trim().is_empty() {
            return Err(Error::invalid_parameter("question", "empty request"));
        }

        if let Some(routed) = self.match_template(input, now) {
            let query = routed?;
            tracing::info!(origin = %query.origin, "Routed to template");
            return Ok(query);
        }

        let prompt = QueryPromptBuilder::build(input.trim(), &self.resolver, now);
        let completion = self.inference.complete(&prompt, &self.sampling).await?;
        let generated = GeneratedQuery::from_completion(input, &completion);

        tracing::debug!(
            provider = self.inference.name(),
            model = self.inference.model(),
            "Statement generated"
        );
        generated.audit();

        Ok(generated.into_executable(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedSql {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceProvider for CannedSql {
        async fn complete(&self, _prompt: &str, sampling: &SamplingConfig) -> Result<String> {
            assert_eq!(sampling.temperature, 0.0);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-sql"
        }
    }

    fn router(reply: &str) -> (QueryRouter, Arc<CannedSql>) {
        let inference = Arc::new(CannedSql {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        });
        let router = QueryRouter::from_config(&AppConfig::default(), inference.clone()).unwrap();
        (router, inference)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(QueryRouter::normalize("  show   recent records?? "), "show recent records");
        assert_eq!(QueryRouter::normalize("今日の件数は？"), "今日の件数は");
    }

    #[test]
    fn test_validated_keeps_verdict() {
        let query = GeneratedQuery::from_completion("count errors", "SELECT 1").into_executable(Utc::now());
        let audited = GeneratedQuery::validated(&query, Err(GuardrailViolation::NotReadOnly));
        assert_eq!(audited.candidate_statement, "SELECT 1");
        assert_eq!(audited.validation_result, Some(Err(GuardrailViolation::NotReadOnly)));
        audited.audit();
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(
            strip_fences("```sql\nSELECT object_key FROM ingested_records\n```"),
            "SELECT object_key FROM ingested_records"
        );
        assert_eq!(strip_fences("SQL: SELECT 1"), "SELECT 1");
        assert_eq!(strip_fences("  SELECT 1  "), "SELECT 1");
    }

    #[tokio::test]
    async fn test_template_wins_without_inference() {
        let (router, inference) = router("SELECT 1");
        let query = router.route("Show the 10 most recent records.", Utc::now()).await.unwrap();

        assert_eq!(
            query.origin,
            QueryOrigin::Template {
                template_id: "recent_records".to_string()
            }
        );
        assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_parameter_does_not_fall_through() {
        let (router, inference) = router("SELECT 1");
        let err = router.route("show 900 recent records", Utc::now()).await.unwrap_err();

        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_generated() {
        let (router, inference) = router(
            "```sql\nSELECT COUNT(*) AS record_count FROM ingested_records WHERE processing_status = 'ERROR'\n```",
        );
        let query = router
            .route("how many records have ERROR status", Utc::now())
            .await
            .unwrap();

        assert_eq!(query.origin, QueryOrigin::Generated);
        assert!(query.statement.starts_with("SELECT COUNT(*)"));
        assert!(query.parameters.is_empty());
        assert_eq!(inference.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let (router, _) = router("SELECT 1");
        assert!(router.route("   ", Utc::now()).await.is_err());
    }
}
