//! Curated query templates
//!
//! A template pairs a trigger pattern with a parameterized statement. Named
//! capture groups in the pattern feed the parameters, which are type-checked
//! and bound positionally; captured text is never spliced into SQL.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ProcessingStatus, SqlParam};

use super::time_range::TimeResolver;

/// Escape character used by `contains` parameters in `LIKE ... ESCAPE '!'`
pub const LIKE_ESCAPE: char = '!';

const DEFAULT_TEXT_MAX_LEN: usize = 200;

/// Parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Whole number, optionally bounded by `min`/`max`
    Integer,
    /// SUCCESS or ERROR
    Status,
    /// Free text, bound as-is
    Text,
    /// Free text, bound as a `%...%` LIKE pattern
    Contains,
    /// Relative time expression; binds two values, start then end
    TimeRange,
}

/// Declared template parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamDef {
    /// Capture group name in the trigger pattern
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Used when the group did not participate in the match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ParamDef {
    fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            min: None,
            max: None,
            max_len: None,
            default: None,
        }
    }

    fn bounded(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    /// Number of placeholders this parameter fills
    pub fn arity(&self) -> usize {
        match self.param_type {
            ParamType::TimeRange => 2,
            _ => 1,
        }
    }

    /// Type-check a captured value and convert it to bind values
    fn bind(&self, raw: &str, resolver: &TimeResolver, now: DateTime<Utc>) -> Result<Vec<SqlParam>> {
        let value = raw.trim();
        let invalid = |message: String| Error::invalid_parameter(&self.name, message);

        match self.param_type {
            ParamType::Integer => {
                let n: i64 = value
                    .parse()
                    .map_err(|_| invalid(format!("'{}' is not a whole number", value)))?;
                if let Some(min) = self.min.filter(|min| n < *min) {
                    return Err(invalid(format!("{} is below the minimum {}", n, min)));
                }
                if let Some(max) = self.max.filter(|max| n > *max) {
                    return Err(invalid(format!("{} is above the maximum {}", n, max)));
                }
                Ok(vec![SqlParam::Integer(n)])
            }
            ParamType::Status => {
                let status = match value.to_lowercase().as_str() {
                    "failed" | "failure" | "failures" | "errors" => Some(ProcessingStatus::Error),
                    "successful" | "succeeded" | "ok" => Some(ProcessingStatus::Success),
                    other => ProcessingStatus::parse(other),
                }
                .ok_or_else(|| invalid(format!("'{}' is not SUCCESS or ERROR", value)))?;
                Ok(vec![SqlParam::Text(status.as_str().to_string())])
            }
            ParamType::Text | ParamType::Contains => {
                let max_len = self.max_len.unwrap_or(DEFAULT_TEXT_MAX_LEN);
                if value.is_empty() {
                    return Err(invalid("empty value".to_string()));
                }
                if value.chars().count() > max_len {
                    return Err(invalid(format!("longer than {} characters", max_len)));
                }
                if self.param_type == ParamType::Contains {
                    Ok(vec![SqlParam::Text(format!("%{}%", escape_like(value)))])
                } else {
                    Ok(vec![SqlParam::Text(value.to_string())])
                }
            }
            ParamType::TimeRange => {
                let range = resolver
                    .resolve_expr(value, now)
                    .map_err(|_| invalid(format!("unsupported time expression '{}'", value)))?;
                Ok(vec![SqlParam::Timestamp(range.start), SqlParam::Timestamp(range.end)])
            }
        }
    }
}

/// Escape LIKE wildcards with [`LIKE_ESCAPE`]
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Template as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateDef {
    pub template_id: String,
    /// Regex over the normalized request, matched case-insensitively
    pub trigger_pattern: String,
    /// Parameters in placeholder order
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    /// SQL with `?1..?N` placeholders
    pub statement: String,
    /// Output projection
    #[serde(default)]
    pub allowed_output_columns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// A template ready for matching
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    def: TemplateDef,
    pattern: Regex,
}

impl QueryTemplate {
    /// Compile a definition, checking its parameters against the pattern and statement
    pub fn compile(def: TemplateDef) -> Result<Self> {
        let pattern = RegexBuilder::new(&def.trigger_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                Error::Config(format!("Template '{}' has an invalid pattern: {}", def.template_id, e))
            })?;

        let groups: Vec<&str> = pattern.capture_names().flatten().collect();
        for param in &def.parameters {
            if !groups.contains(&param.name.as_str()) && param.default.is_none() {
                return Err(Error::Config(format!(
                    "Template '{}' parameter '{}' has no capture group and no default",
                    def.template_id, param.name
                )));
            }
        }

        let bound: usize = def.parameters.iter().map(ParamDef::arity).sum();
        let highest = highest_placeholder(&def.statement);
        if highest != bound {
            return Err(Error::Config(format!(
                "Template '{}' statement uses ?{} but its parameters bind {} values",
                def.template_id, highest, bound
            )));
        }

        Ok(Self { def, pattern })
    }

    pub fn id(&self) -> &str {
        &self.def.template_id
    }

    pub fn statement(&self) -> &str {
        &self.def.statement
    }

    pub fn allowed_output_columns(&self) -> &[String] {
        &self.def.allowed_output_columns
    }

    pub fn def(&self) -> &TemplateDef {
        &self.def
    }

    /// Match a normalized request
    ///
    /// `None` when the pattern does not match. A match with an invalid
    /// parameter is `Some(Err(..))`.
    pub fn try_match(
        &self,
        input: &str,
        resolver: &TimeResolver,
        now: DateTime<Utc>,
    ) -> Option<Result<Vec<SqlParam>>> {
        let captures = self.pattern.captures(input)?;

        let bind = || -> Result<Vec<SqlParam>> {
            let mut values = Vec::new();
            for param in &self.def.parameters {
                let raw = captures
                    .name(&param.name)
                    .map(|m| m.as_str())
                    .or(param.default.as_deref())
                    .ok_or_else(|| Error::invalid_parameter(&param.name, "missing value"))?;
                values.extend(param.bind(raw, resolver, now)?);
            }
            Ok(values)
        };

        Some(bind())
    }
}

/// Highest `?N` placeholder number in a statement, ignoring string literals
fn highest_placeholder(statement: &str) -> usize {
    let mut highest = 0;
    let mut in_literal = false;
    let mut chars = statement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                highest = highest.max(digits.parse().unwrap_or(0));
            }
            _ => {}
        }
    }
    highest
}

const PERIOD: &str = r"(?P<period>today|yesterday|(?:this|last) (?:week|month)|(?:last|past) \d{1,4} days?)";

/// Templates used when configuration does not provide any
pub fn default_templates() -> Vec<TemplateDef> {
    vec![
        TemplateDef {
            template_id: "recent_records".to_string(),
            trigger_pattern: r"^(?:show|list)(?: me)?(?: the)?(?: (?P<limit>\d{1,4}))?(?: most)? (?:recent|latest) (?:records|documents|files)$".to_string(),
            parameters: vec![ParamDef::new("limit", ParamType::Integer)
                .bounded(1, 500)
                .with_default("20")],
            statement: "SELECT record_id, object_key, processing_status, budget_tier, summary, processed_at \
                        FROM ingested_records ORDER BY processed_at DESC LIMIT ?1"
                .to_string(),
            allowed_output_columns: columns(&[
                "record_id",
                "object_key",
                "processing_status",
                "budget_tier",
                "summary",
                "processed_at",
            ]),
            description: "Most recently processed records".to_string(),
        },
        TemplateDef {
            template_id: "records_in_period".to_string(),
            trigger_pattern: format!(
                r"^how many (?:records|documents|files)(?: were| have been)? (?:ingested|processed|added)(?: in| during)?(?: the)? {}$",
                PERIOD
            ),
            parameters: vec![ParamDef::new("period", ParamType::TimeRange)],
            statement: "SELECT COUNT(*) AS record_count FROM ingested_records \
                        WHERE processed_at >= ?1 AND processed_at < ?2"
                .to_string(),
            allowed_output_columns: columns(&["record_count"]),
            description: "Count of records processed in a relative period".to_string(),
        },
        TemplateDef {
            template_id: "failures_in_period".to_string(),
            trigger_pattern: format!(
                r"^(?:show|list)(?: me)?(?: the)? (?:failures|errors|failed (?:records|documents|files))(?: from| in| during)?(?: the)? {}$",
                PERIOD
            ),
            parameters: vec![ParamDef::new("period", ParamType::TimeRange)],
            statement: "SELECT record_id, object_key, error_detail, processed_at FROM ingested_records \
                        WHERE processing_status = 'ERROR' AND processed_at >= ?1 AND processed_at < ?2 \
                        ORDER BY processed_at DESC"
                .to_string(),
            allowed_output_columns: columns(&["record_id", "object_key", "error_detail", "processed_at"]),
            description: "Failed attempts in a relative period".to_string(),
        },
        TemplateDef {
            template_id: "records_by_status".to_string(),
            trigger_pattern: r"^(?:show|list)(?: me)?(?: the)?(?: all)? (?P<status>success|successful|error|failed) (?:records|documents|files)$".to_string(),
            parameters: vec![ParamDef::new("status", ParamType::Status)],
            statement: "SELECT record_id, object_key, processing_status, processed_at FROM ingested_records \
                        WHERE processing_status = ?1 ORDER BY processed_at DESC"
                .to_string(),
            allowed_output_columns: columns(&["record_id", "object_key", "processing_status", "processed_at"]),
            description: "Records with a given processing status".to_string(),
        },
        TemplateDef {
            template_id: "search_text".to_string(),
            trigger_pattern: r"^(?:find|search)(?: for)? (?:records|documents|files) (?:mentioning|containing|about) (?P<term>.+)$".to_string(),
            parameters: vec![ParamDef {
                max_len: Some(100),
                ..ParamDef::new("term", ParamType::Contains)
            }],
            statement: "SELECT record_id, object_key, summary, processed_at FROM ingested_records \
                        WHERE processing_status = 'SUCCESS' AND decoded_text LIKE ?1 ESCAPE '!' \
                        ORDER BY processed_at DESC"
                .to_string(),
            allowed_output_columns: columns(&["record_id", "object_key", "summary", "processed_at"]),
            description: "Documents whose text contains a phrase".to_string(),
        },
    ]
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
