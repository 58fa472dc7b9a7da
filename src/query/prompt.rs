//! Prompt text for query generation and answer summaries.
use crate::llm::Prompt;
use crate::query::executor::ExecutionResult;
use crate::selector::SchemaSlice;
use std::fmt::Write;

const SQL_SYSTEM_PROMPT: &str = "You are a helpful assistant that writes SQL queries for DuckDB databases.

RULES:
- Write exactly one read-only SELECT statement; WITH clauses are allowed.
- Use only the tables and columns listed in the schema, spelled exactly as listed.
- Use DuckDB SQL syntax and functions only.
- Do NOT explain the query and do NOT use markdown code blocks.";

const SUMMARY_SYSTEM_PROMPT: &str = "You answer questions about spreadsheet data.

RULES:
- Base the answer only on the query result you are given.
- Answer in a few plain sentences and state the relevant values.
- If the result is a sample of a larger result, say so.";

/// The SQL statement that failed last time and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feedback {
    pub sql: String,
    pub error: String,
}

/// Prompt asking for one SQL query over `slice`, with the previous failure if any.
pub fn sql_prompt(question: &str, slice: &SchemaSlice, feedback: Option<&Feedback>) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "Write a SQL query that answers the question:\n\"{question}\"\n");
    let _ = writeln!(user, "Given the following DuckDB database schema:\n{}", slice.render());
    if let Some(feedback) = feedback {
        user.push_str("A previous attempt failed.\n");
        if !feedback.sql.is_empty() {
            let _ = writeln!(user, "SQL:\n{}", feedback.sql);
        }
        let _ = writeln!(user, "Error: {}\nWrite a corrected query.\n", feedback.error);
    }
    user.push_str("Only return the SQL query, and nothing else.");
    Prompt {
        system: SQL_SYSTEM_PROMPT.to_owned(),
        user,
    }
}

/// Prompt asking for a prose answer from at most `sample_rows` result rows.
pub fn summary_prompt(question: &str, sql: &str, result: &ExecutionResult, sample_rows: usize) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "QUESTION:\n{question}\n");
    let _ = writeln!(user, "SQL:\n{sql}\n");
    let shown = result.row_count().min(sample_rows);
    let _ = writeln!(user, "RESULT ({} rows, columns: {}):", result.row_count(), result.columns.join(", "));
    user.push_str(&render_rows(result, shown));
    if shown < result.row_count() {
        let _ = writeln!(user, "(showing the first {shown} of {} rows)", result.row_count());
    }
    user.push_str("\nAnswer the question using this result.");
    Prompt {
        system: SUMMARY_SYSTEM_PROMPT.to_owned(),
        user,
    }
}

/// Renders the first `limit` rows as a pipe-separated table with a header.
pub fn render_rows(result: &ExecutionResult, limit: usize) -> String {
    let mut text = format!("| {} |\n", result.columns.join(" | "));
    for row in result.rows.iter().take(limit) {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        let _ = writeln!(text, "| {} |", cells.join(" | "));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::table;
    use crate::database::column::ColumnType;
    use crate::value::CellValue;

    fn slice() -> SchemaSlice {
        SchemaSlice::new(1, vec![table("sales_q1", "sales.xlsx", &[("region", ColumnType::Text), ("units", ColumnType::Integer)])])
    }

    #[test]
    fn sql_prompt_lists_schema() {
        let prompt = sql_prompt("Total units per region?", &slice(), None);
        assert!(prompt.system.contains("DuckDB"));
        assert!(prompt.user.contains("\"Total units per region?\""));
        assert!(prompt.user.contains("Table: sales_q1"));
        assert!(prompt.user.contains("- units (integer)"));
        assert!(!prompt.user.contains("previous attempt"));
    }

    #[test]
    fn sql_prompt_carries_feedback() {
        let feedback = Feedback {
            sql: "SELECT revenue FROM sales_q1".to_owned(),
            error: "Unknown column 'revenue'".to_owned(),
        };
        let prompt = sql_prompt("Revenue?", &slice(), Some(&feedback));
        assert!(prompt.user.contains("SELECT revenue FROM sales_q1"));
        assert!(prompt.user.contains("Unknown column 'revenue'"));
    }

    #[test]
    fn summary_prompt_samples_rows() {
        let result = ExecutionResult {
            columns: vec!["region".to_owned(), "total".to_owned()],
            rows: (0..30)
                .map(|n| vec![CellValue::Text(format!("r{n}")), CellValue::Integer(n)])
                .collect(),
        };
        let prompt = summary_prompt("Totals?", "SELECT 1", &result, 20);
        assert!(prompt.user.contains("RESULT (30 rows, columns: region, total)"));
        assert!(prompt.user.contains("| r19 | 19 |"));
        assert!(!prompt.user.contains("| r20 | 20 |"));
        assert!(prompt.user.contains("showing the first 20 of 30 rows"));
    }
}
