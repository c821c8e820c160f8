//! Query service: router, guardrail and executor wired together

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::providers::InferenceProvider;
use crate::storage::RecordStore;
use crate::types::{ExecutableQuery, QueryAnswer, QueryOrigin, SqlParam};

use super::guardrail::GuardrailValidator;
use super::router::{GeneratedQuery, QueryRouter};

/// Answers natural-language requests over the record store
pub struct QueryService {
    router: QueryRouter,
    validator: GuardrailValidator,
    records: Arc<dyn RecordStore>,
    max_rows: usize,
}

impl QueryService {
    /// Create the service, validating every template up front
    pub fn new(
        router: QueryRouter,
        validator: GuardrailValidator,
        records: Arc<dyn RecordStore>,
        max_rows: usize,
    ) -> Result<Self> {
        for template in router.templates() {
            let arity: usize = template.def().parameters.iter().map(|p| p.arity()).sum();
            let probe = ExecutableQuery {
                origin: QueryOrigin::Template {
                    template_id: template.id().to_string(),
                },
                natural_language_input: String::new(),
                statement: template.statement().to_string(),
                parameters: vec![SqlParam::Text(String::new()); arity],
                allowed_output_columns: template.allowed_output_columns().to_vec(),
                routed_at: Utc::now(),
            };

            if let Err(violation) = validator.validate(&probe) {
                tracing::error!(
                    template_id = template.id(),
                    violation = %violation,
                    "Template fails guardrail checks"
                );
                return Err(Error::Config(format!(
                    "Template '{}' fails guardrail checks: {}",
                    template.id(),
                    violation
                )));
            }
        }

        tracing::info!("Query service ready with {} templates", router.templates().len());

        Ok(Self {
            router,
            validator,
            records,
            max_rows,
        })
    }

    pub fn from_config(
        config: &AppConfig,
        inference: Arc<dyn InferenceProvider>,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        Self::new(
            QueryRouter::from_config(config, inference)?,
            GuardrailValidator::new(&config.guardrail)?,
            records,
            config.query.max_rows,
        )
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    /// Answer a request, resolving relative time against `now`
    pub async fn ask(&self, input: &str, now: DateTime<Utc>) -> Result<QueryAnswer> {
        let start = Instant::now();

        let query = self.router.route(input, now).await?;

        let verdict = self.validator.validate(&query);
        if query.origin == QueryOrigin::Generated {
            GeneratedQuery::validated(&query, verdict.as_ref().map(|_| ()).map_err(Clone::clone))
                .audit();
        }

        let approved = match verdict {
            Ok(approved) => approved,
            Err(violation) => {
                return Err(match &query.origin {
                    QueryOrigin::Template { template_id } => {
                        tracing::error!(
                            template_id = %template_id,
                            violation = %violation,
                            "Template rejected by guardrail"
                        );
                        Error::Guardrail(violation)
                    }
                    QueryOrigin::Generated => Error::Refused {
                        reason: violation.to_string(),
                    },
                });
            }
        };

        let rows = self.records.execute_read(&approved, self.max_rows)?;
        let answer = QueryAnswer::new(
            approved.query(),
            rows,
            start.elapsed().as_millis() as u64,
        );

        tracing::info!(
            origin = %answer.origin,
            rows = answer.row_count,
            truncated = answer.truncated,
            elapsed_ms = answer.processing_time_ms,
            "Answered query"
        );

        Ok(answer)
    }
}
