//! Static checks applied to every query before execution
//!
//! [`ApprovedQuery`] can only be built by [`GuardrailValidator::validate`], so
//! the executor's signature guarantees that nothing unvalidated runs.

use regex::Regex;
use sqlparser::ast::{Expr, ObjectName, Query, SelectItem, SetExpr, Statement, Value, Visit, Visitor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use thiserror::Error;

use crate::config::GuardrailConfig;
use crate::error::{Error, Result};
use crate::types::{ExecutableQuery, QueryOrigin, SqlParam};

const MUTATION_VERBS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
    "UPSERT", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "GRANT", "REVOKE",
];

/// SQLite functions that touch the filesystem or extensions
const DENIED_FUNCTIONS: &[&str] = &["load_extension", "readfile", "writefile", "edit", "fts3_tokenizer"];

/// Why a statement was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardrailViolation {
    #[error("statement is empty")]
    Empty,

    #[error("statement is {len} characters, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("statement contains the mutation keyword {0}")]
    MutationVerb(String),

    #[error("statement could not be parsed: {0}")]
    Unparseable(String),

    #[error("expected one statement, found {0}")]
    MultipleStatements(usize),

    #[error("statement is not a read-only query")]
    NotReadOnly,

    #[error("table '{0}' is not allowed")]
    DisallowedTable(String),

    #[error("column '{0}' is not allowed")]
    DisallowedColumn(String),

    #[error("function '{0}' is not allowed")]
    DisallowedFunction(String),

    #[error("wildcard projection is not allowed")]
    Wildcard,

    #[error("recursive common table expressions are only allowed in curated templates")]
    RecursiveCte,

    #[error("statement uses {found} placeholders but {bound} values are bound")]
    ParameterMismatch { found: usize, bound: usize },
}

/// A query that passed every guardrail check
#[derive(Debug, Clone)]
pub struct ApprovedQuery {
    query: ExecutableQuery,
}

impl ApprovedQuery {
    pub fn query(&self) -> &ExecutableQuery {
        &self.query
    }

    pub fn origin(&self) -> &QueryOrigin {
        &self.query.origin
    }

    pub fn statement(&self) -> &str {
        &self.query.statement
    }

    pub fn parameters(&self) -> &[SqlParam] {
        &self.query.parameters
    }

    pub fn allowed_output_columns(&self) -> &[String] {
        &self.query.allowed_output_columns
    }

    pub fn into_inner(self) -> ExecutableQuery {
        self.query
    }
}

/// Validates statements against the read-only allow-lists
#[derive(Debug, Clone)]
pub struct GuardrailValidator {
    allowed_tables: HashSet<String>,
    allowed_columns: HashSet<String>,
    allow_wildcard: bool,
    max_statement_chars: usize,
    mutation_pattern: Regex,
    literal_pattern: Regex,
}

impl GuardrailValidator {
    pub fn new(config: &GuardrailConfig) -> Result<Self> {
        let mutation_pattern = Regex::new(&format!(r"(?i)\b({})\b", MUTATION_VERBS.join("|")))
            .map_err(|e| Error::Config(format!("Invalid mutation pattern: {}", e)))?;
        let literal_pattern = Regex::new(r"'(?:[^']|'')*'")
            .map_err(|e| Error::Config(format!("Invalid literal pattern: {}", e)))?;

        Ok(Self {
            allowed_tables: lowercase_set(&config.allowed_tables),
            allowed_columns: lowercase_set(&config.allowed_columns),
            allow_wildcard: config.allow_wildcard,
            max_statement_chars: config.max_statement_chars,
            mutation_pattern,
            literal_pattern,
        })
    }

    /// Check a routed query
    pub fn validate(
        &self,
        query: &ExecutableQuery,
    ) -> std::result::Result<ApprovedQuery, GuardrailViolation> {
        let names = self.check_statement(&query.statement, &query.parameters)?;
        if names.recursive && query.origin == QueryOrigin::Generated {
            return Err(GuardrailViolation::RecursiveCte);
        }
        Ok(ApprovedQuery {
            query: query.clone(),
        })
    }

    fn check_statement(
        &self,
        sql: &str,
        parameters: &[SqlParam],
    ) -> std::result::Result<NameCollector, GuardrailViolation> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(GuardrailViolation::Empty);
        }

        let len = sql.chars().count();
        if len > self.max_statement_chars {
            return Err(GuardrailViolation::TooLong {
                len,
                limit: self.max_statement_chars,
            });
        }

        let without_literals = self.literal_pattern.replace_all(sql, "''");
        if let Some(verb) = self.mutation_pattern.find(&without_literals) {
            return Err(GuardrailViolation::MutationVerb(verb.as_str().to_uppercase()));
        }

        let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
            .map_err(|e| GuardrailViolation::Unparseable(e.to_string()))?;
        let statement = match statements.as_slice() {
            [statement] => statement,
            [] => return Err(GuardrailViolation::Empty),
            many => return Err(GuardrailViolation::MultipleStatements(many.len())),
        };
        if !matches!(statement, Statement::Query(_)) {
            return Err(GuardrailViolation::NotReadOnly);
        }

        let mut names = NameCollector::default();
        let _ = statement.visit(&mut names);
        if names.wildcard && !self.allow_wildcard {
            return Err(GuardrailViolation::Wildcard);
        }

        let mut checker = ReferenceChecker {
            validator: self,
            names: &names,
            highest_numbered: 0,
            anonymous: 0,
        };
        if let ControlFlow::Break(violation) = statement.visit(&mut checker) {
            return Err(violation);
        }

        let bound = parameters.len();
        let found = checker.highest_numbered.max(checker.anonymous);
        if found != bound {
            return Err(GuardrailViolation::ParameterMismatch { found, bound });
        }

        Ok(names)
    }
}

fn lowercase_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// First pass: names the statement defines for itself
#[derive(Default)]
struct NameCollector {
    ctes: HashSet<String>,
    aliases: HashSet<String>,
    wildcard: bool,
    recursive: bool,
}

impl NameCollector {
    fn collect_projection(&mut self, set: &SetExpr) {
        match set {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    match item {
                        SelectItem::ExprWithAlias { alias, .. } => {
                            self.aliases.insert(alias.value.to_lowercase());
                        }
                        SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                            self.wildcard = true;
                        }
                        _ => {}
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_projection(left);
                self.collect_projection(right);
            }
            _ => {}
        }
    }
}

impl Visitor for NameCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            self.recursive |= with.recursive;
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        self.collect_projection(&query.body);
        ControlFlow::Continue(())
    }
}

/// Second pass: every table, column and function reference
struct ReferenceChecker<'a> {
    validator: &'a GuardrailValidator,
    names: &'a NameCollector,
    highest_numbered: usize,
    anonymous: usize,
}

impl ReferenceChecker<'_> {
    fn check_column(&self, name: &str) -> ControlFlow<GuardrailViolation> {
        let lower = name.to_lowercase();
        if self.validator.allowed_columns.contains(&lower) || self.names.aliases.contains(&lower) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(GuardrailViolation::DisallowedColumn(name.to_string()))
        }
    }
}

impl Visitor for ReferenceChecker<'_> {
    type Break = GuardrailViolation;

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let name = object_name(relation);
        if self.validator.allowed_tables.contains(&name) || self.names.ctes.contains(&name) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(GuardrailViolation::DisallowedTable(name))
        }
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.check_column(&ident.value),
            Expr::CompoundIdentifier(parts) => match parts.last() {
                Some(ident) => self.check_column(&ident.value),
                None => ControlFlow::Continue(()),
            },
            Expr::Function(function) => {
                let name = object_name(&function.name);
                if DENIED_FUNCTIONS.contains(&name.as_str()) {
                    ControlFlow::Break(GuardrailViolation::DisallowedFunction(name))
                } else {
                    ControlFlow::Continue(())
                }
            }
            Expr::Value(Value::Placeholder(placeholder)) => {
                match placeholder.trim_start_matches('?').parse::<usize>() {
                    Ok(n) => self.highest_numbered = self.highest_numbered.max(n),
                    Err(_) => self.anonymous += 1,
                }
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn validator() -> GuardrailValidator {
        GuardrailValidator::new(&GuardrailConfig::default()).unwrap()
    }

    fn generated(sql: &str) -> ExecutableQuery {
        ExecutableQuery {
            origin: QueryOrigin::Generated,
            natural_language_input: "test".to_string(),
            statement: sql.to_string(),
            parameters: Vec::new(),
            allowed_output_columns: Vec::new(),
            routed_at: Utc::now(),
        }
    }

    fn check(sql: &str) -> std::result::Result<ApprovedQuery, GuardrailViolation> {
        validator().validate(&generated(sql))
    }

    #[test]
    fn test_accepts_plain_select() {
        let approved = check(
            "SELECT COUNT(*) AS record_count FROM ingested_records WHERE processing_status = 'ERROR'",
        )
        .unwrap();
        assert_eq!(approved.origin(), &QueryOrigin::Generated);
    }

    #[test]
    fn test_accepts_cte_and_alias_in_order_by() {
        check(
            "WITH failures AS (SELECT object_key FROM ingested_records WHERE processing_status = 'ERROR') \
             SELECT object_key, COUNT(*) AS attempts FROM failures GROUP BY object_key ORDER BY attempts DESC",
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_mutations() {
        for sql in [
            "DELETE FROM ingested_records",
            "UPDATE ingested_records SET summary = 'x'",
            "INSERT INTO ingested_records (record_id) VALUES ('x')",
            "DROP TABLE ingested_records",
            "select 1; drop table ingested_records",
            "PRAGMA writable_schema = 1",
            "ATTACH DATABASE 'evil.db' AS evil",
            "WITH gone AS (DELETE FROM ingested_records RETURNING record_id) SELECT record_id FROM gone",
        ] {
            assert!(
                matches!(check(sql), Err(GuardrailViolation::MutationVerb(_))),
                "accepted: {}",
                sql
            );
        }
    }

    #[test]
    fn test_verbs_inside_literals_are_fine() {
        check("SELECT object_key FROM ingested_records WHERE summary LIKE '%delete the backlog%'").unwrap();
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert_eq!(
            check("SELECT object_key FROM ingested_records; SELECT summary FROM ingested_records")
                .unwrap_err(),
            GuardrailViolation::MultipleStatements(2)
        );
    }

    #[test]
    fn test_rejects_other_tables_and_columns() {
        assert_eq!(
            check("SELECT object_key FROM sqlite_master").unwrap_err(),
            GuardrailViolation::DisallowedTable("sqlite_master".to_string())
        );
        assert_eq!(
            check("SELECT password FROM ingested_records").unwrap_err(),
            GuardrailViolation::DisallowedColumn("password".to_string())
        );
    }

    #[test]
    fn test_rejects_wildcard_unless_allowed() {
        assert_eq!(
            check("SELECT * FROM ingested_records").unwrap_err(),
            GuardrailViolation::Wildcard
        );

        let config = GuardrailConfig {
            allow_wildcard: true,
            ..GuardrailConfig::default()
        };
        GuardrailValidator::new(&config)
            .unwrap()
            .validate(&generated("SELECT * FROM ingested_records"))
            .unwrap();
    }

    #[test]
    fn test_rejects_denied_functions() {
        assert_eq!(
            check("SELECT load_extension('evil') AS x").unwrap_err(),
            GuardrailViolation::DisallowedFunction("load_extension".to_string())
        );
    }

    #[test]
    fn test_rejects_unparseable_and_long() {
        assert!(matches!(check("SELEKT object_key"), Err(GuardrailViolation::Unparseable(_))));
        assert_eq!(check("   ").unwrap_err(), GuardrailViolation::Empty);

        let long = format!("SELECT object_key FROM ingested_records WHERE summary = '{}'", "x".repeat(5000));
        assert!(matches!(check(&long), Err(GuardrailViolation::TooLong { .. })));
    }

    #[test]
    fn test_placeholders_must_match_parameters() {
        let mut query = generated("SELECT object_key FROM ingested_records WHERE processing_status = ?1");
        assert_eq!(
            validator().validate(&query).unwrap_err(),
            GuardrailViolation::ParameterMismatch { found: 1, bound: 0 }
        );

        query.parameters.push(SqlParam::Text("ERROR".to_string()));
        validator().validate(&query).unwrap();
    }

    #[test]
    fn test_template_origin_checked_too() {
        let mut query = generated("DELETE FROM ingested_records WHERE processed_at < ?1");
        query.origin = QueryOrigin::Template {
            template_id: "purge".to_string(),
        };
        query.parameters.push(SqlParam::Text("2020-01-01".to_string()));
        assert!(validator().validate(&query).is_err());
    }

    #[test]
    fn test_recursive_cte_only_for_templates() {
        let sql = "WITH RECURSIVE r(size_bytes) AS (SELECT 1 UNION ALL SELECT size_bytes + 1 FROM r) \
                   SELECT COUNT(size_bytes) AS record_count FROM r";
        assert_eq!(check(sql).unwrap_err(), GuardrailViolation::RecursiveCte);

        let mut query = generated(sql);
        query.origin = QueryOrigin::Template {
            template_id: "curated".to_string(),
        };
        validator().validate(&query).unwrap();
    }
}
