//! Prompt for SQL generation

use chrono::{DateTime, Utc};

use crate::storage::{format_timestamp, RECORDS_TABLE, RECORD_SCHEMA};

use super::time_range::{RelativeRange, TimeResolver};

/// Request/statement pairs shown to the model
const EXEMPLARS: &[(&str, &str)] = &[
    (
        "how many documents were summarized successfully",
        "SELECT COUNT(*) AS record_count FROM ingested_records WHERE processing_status = 'SUCCESS'",
    ),
    (
        "which encodings do the documents use",
        "SELECT encoding_used, COUNT(*) AS record_count FROM ingested_records \
         WHERE processing_status = 'SUCCESS' GROUP BY encoding_used ORDER BY record_count DESC",
    ),
    (
        "list the five largest files processed yesterday",
        "SELECT object_key, size_bytes FROM ingested_records \
         WHERE processed_at >= '<yesterday start>' AND processed_at < '<yesterday end>' \
         ORDER BY size_bytes DESC LIMIT 5",
    ),
];

/// Builds the SQL generation prompt
pub struct QueryPromptBuilder;

impl QueryPromptBuilder {
    /// Schema description: one line per column
    pub fn schema() -> String {
        let mut out = format!("TABLE {} (\n", RECORDS_TABLE);
        for column in RECORD_SCHEMA {
            out.push_str(&format!(
                "  {} {} -- {}\n",
                column.name, column.sql_type, column.description
            ));
        }
        out.push(')');
        out
    }

    /// Pre-resolved bounds for every supported relative expression
    pub fn time_rules(resolver: &TimeResolver, now: DateTime<Utc>) -> String {
        let mut out = format!(
            "Current time: {} (timezone {}). Ranges are [start, end): use >= start AND < end.\n",
            format_timestamp(&now),
            resolver.timezone()
        );
        let ranges = RelativeRange::FIXED
            .into_iter()
            .chain([RelativeRange::LastDays(7), RelativeRange::LastDays(30)]);
        for range in ranges {
            if let Ok(bounds) = resolver.resolve(range, now) {
                out.push_str(&format!(
                    "- {}: '{}' to '{}'\n",
                    range.label(),
                    format_timestamp(&bounds.start),
                    format_timestamp(&bounds.end)
                ));
            }
        }
        out.push_str(
            "- last N days: N calendar days ending today, starting at local midnight\n",
        );
        out
    }

    /// Full prompt for a request
    pub fn build(question: &str, resolver: &TimeResolver, now: DateTime<Utc>) -> String {
        let exemplars = EXEMPLARS
            .iter()
            .map(|(q, sql)| format!("Request: {}\nSQL: {}", q, sql))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"You translate requests into a single SQLite SELECT statement.

RULES:
1. Output exactly one SELECT statement and nothing else: no explanation, no markdown
2. Read only from the table below; never modify data
3. Name every column explicitly; never use SELECT *
4. Use single quotes for string literals
5. Timestamps are RFC 3339 UTC strings; compare them as text with the bounds below

SCHEMA:
{schema}

TIME:
{time_rules}
EXAMPLES:
{exemplars}

Request: {question}
SQL:"#,
            schema = Self::schema(),
            time_rules = Self::time_rules(resolver, now),
            exemplars = exemplars,
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_prompt_contains_schema_and_bounds() {
        let resolver = TimeResolver::new(chrono_tz::UTC, Weekday::Mon);
        let now = DateTime::parse_from_rfc3339("2026-10-14T12:00:00Z").unwrap().with_timezone(&Utc);
        let prompt = QueryPromptBuilder::build("how many errors", &resolver, now);

        assert!(prompt.contains("TABLE ingested_records"));
        assert!(prompt.contains("processing_status TEXT"));
        assert!(prompt.contains("- last month: '2026-09-01T00:00:00.000000Z' to '2026-10-01T00:00:00.000000Z'"));
        assert!(prompt.trim_end().ends_with("Request: how many errors\nSQL:"));
    }
}
