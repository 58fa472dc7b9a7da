use crate::cancel::run_with_deadline;
use crate::cancel::CancelToken;
use crate::cancel::Interrupted;
use crate::config::ExecutionConfig;
use crate::database::store::Store;
use crate::query::validator::ensure_read_only;
use crate::query::validator::ValidationError;
use crate::query::CandidateQuery;
use crate::value::CellValue;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveTime;
use duckdb::types::TimeUnit;
use duckdb::types::Value;
use duckdb::Connection;
use duckdb::Transaction;
use std::time::Duration;
use thiserror::Error;

/// Days from 0001-01-01 (day 1 of the common era) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Query failed: {message}")]
    Failed { message: String },

    #[error("Query returned more than {cap} rows; aggregate or filter the result")]
    ResultTooLarge { cap: usize },

    #[error("Query timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Query rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("Query cancelled")]
    Cancelled,
}

impl From<duckdb::Error> for ExecutionError {
    fn from(error: duckdb::Error) -> Self {
        ExecutionError::Failed {
            message: error.to_string(),
        }
    }
}

/// Column names and rows returned by a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ExecutionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Runs accepted queries against the store without ever changing it.
pub struct QueryExecutor<'s> {
    store: &'s Store,
    row_cap: usize,
    timeout: Duration,
}

impl<'s> QueryExecutor<'s> {
    pub fn new(store: &'s Store, config: &ExecutionConfig) -> Self {
        QueryExecutor {
            store,
            row_cap: config.row_cap,
            timeout: config.timeout(),
        }
    }

    /// Executes a candidate query.
    ///
    /// The statement is checked for read-only-ness again, then runs on its own
    /// connection inside a transaction that is always rolled back. A timed-out
    /// or cancelled statement is interrupted.
    pub fn execute(&self, candidate: &CandidateQuery, cancel: &CancelToken) -> Result<ExecutionResult, ExecutionError> {
        ensure_read_only(&candidate.sql)?;
        let connection = self.store.connection()?;
        let interrupt = connection.interrupt_handle();
        let sql = candidate.sql.to_owned();
        let row_cap = self.row_cap;
        log::debug!("Executing attempt {}: {}", candidate.attempt, candidate.sql);

        match run_with_deadline(move || fetch(connection, &sql, row_cap), self.timeout, cancel, || interrupt.interrupt()) {
            Ok(result) => result,
            Err(Interrupted::Timeout) => Err(ExecutionError::Timeout { timeout: self.timeout }),
            Err(Interrupted::Cancelled) => Err(ExecutionError::Cancelled),
            Err(Interrupted::Failed) => Err(ExecutionError::Failed {
                message: "query worker stopped unexpectedly".to_owned(),
            }),
        }
    }
}

fn fetch(mut connection: Connection, sql: &str, row_cap: usize) -> Result<ExecutionResult, ExecutionError> {
    let transaction = connection.transaction()?;
    let result = read_rows(&transaction, sql, row_cap);
    transaction.rollback()?;
    result
}

fn read_rows(transaction: &Transaction, sql: &str, row_cap: usize) -> Result<ExecutionResult, ExecutionError> {
    let mut statement = transaction.prepare(sql)?;
    let mut rows = statement.query([])?;
    let columns: Vec<String> = rows.as_ref().map(|statement| statement.column_names()).unwrap_or_default();

    let mut result = ExecutionResult {
        columns,
        rows: Vec::new(),
    };
    while let Some(row) = rows.next()? {
        if result.rows.len() == row_cap {
            return Err(ExecutionError::ResultTooLarge { cap: row_cap });
        }
        let mut values = Vec::with_capacity(result.columns.len());
        for index in 0..result.columns.len() {
            values.push(to_cell_value(row.get::<_, Value>(index)?));
        }
        result.rows.push(values);
    }
    Ok(result)
}

fn to_cell_value(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Boolean(value) => CellValue::Boolean(value),
        Value::TinyInt(value) => CellValue::Integer(value.into()),
        Value::SmallInt(value) => CellValue::Integer(value.into()),
        Value::Int(value) => CellValue::Integer(value.into()),
        Value::BigInt(value) => CellValue::Integer(value),
        Value::UTinyInt(value) => CellValue::Integer(value.into()),
        Value::USmallInt(value) => CellValue::Integer(value.into()),
        Value::UInt(value) => CellValue::Integer(value.into()),
        Value::UBigInt(value) => i64::try_from(value)
            .map(CellValue::Integer)
            .unwrap_or(CellValue::Real(value as f64)),
        Value::HugeInt(value) => i64::try_from(value)
            .map(CellValue::Integer)
            .unwrap_or(CellValue::Real(value as f64)),
        Value::Float(value) => CellValue::Real(value.into()),
        Value::Double(value) => CellValue::Real(value),
        Value::Decimal(value) => {
            let text = value.to_string();
            text.parse().map(CellValue::Real).unwrap_or(CellValue::Text(text))
        }
        Value::Text(value) | Value::Enum(value) => CellValue::Text(value),
        Value::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        Value::Timestamp(unit, value) => DateTime::from_timestamp_micros(to_micros(unit, value))
            .map(|datetime| CellValue::DateTime(datetime.naive_utc()))
            .unwrap_or(CellValue::Null),
        Value::Time64(unit, value) => {
            let micros = to_micros(unit, value);
            NaiveTime::from_num_seconds_from_midnight_opt((micros / 1_000_000) as u32, 0)
                .map(|time| CellValue::Text(time.format("%H:%M:%S").to_string()))
                .unwrap_or(CellValue::Null)
        }
        other => CellValue::Text(format!("{other:?}")),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::table;
    use crate::database::column::ColumnType;
    use crate::selector::SchemaSlice;
    use std::sync::Arc;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TABLE sales_q1 (region VARCHAR, units BIGINT, sold_on DATE);
                 INSERT INTO sales_q1 VALUES ('East', 10, '2024-01-02'), ('West', 20, '2024-01-03'), ('East', 5, NULL);",
            )
            .unwrap();
        store
    }

    fn candidate(sql: &str) -> CandidateQuery {
        let slice = SchemaSlice::new(1, vec![table("sales_q1", "sales.xlsx", &[("region", ColumnType::Text)])]);
        CandidateQuery {
            sql: sql.to_owned(),
            slice: Arc::new(slice),
            attempt: 1,
        }
    }

    #[test]
    fn grouped_sum() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let result = executor
            .execute(
                &candidate("SELECT region, SUM(units) AS total FROM sales_q1 GROUP BY region ORDER BY region"),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(result.columns, vec!["region", "total"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[0][0], CellValue::Text("East".to_owned()));
        assert_eq!(result.rows[0][1].as_real(), Some(15.0));
    }

    #[test]
    fn typed_values() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let result = executor
            .execute(
                &candidate("SELECT sold_on, units > 5 AS big, 1.5::DOUBLE AS ratio, TIMESTAMP '2024-01-02 03:04:05' AS stamp FROM sales_q1 ORDER BY units"),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(result.rows[0][0], CellValue::Null);
        assert_eq!(result.rows[1][0], CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        assert_eq!(result.rows[1][1], CellValue::Boolean(true));
        assert_eq!(result.rows[1][2], CellValue::Real(1.5));
        assert_eq!(result.rows[1][3].to_string(), "2024-01-02 03:04:05");
    }

    #[test]
    fn repeated_runs_change_nothing() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let query = candidate("SELECT count(*) AS n FROM sales_q1");
        let first = executor.execute(&query, &CancelToken::new()).unwrap();
        let second = executor.execute(&query, &CancelToken::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.rows[0][0], CellValue::Integer(3));
    }

    #[test]
    fn writes_are_rejected_before_running() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let error = executor.execute(&candidate("DELETE FROM sales_q1"), &CancelToken::new()).unwrap_err();
        assert!(matches!(error, ExecutionError::Rejected(ValidationError::NotReadOnly(_))));
        let count: i64 = store
            .connection()
            .unwrap()
            .query_row("SELECT count(*) FROM sales_q1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn database_errors_are_reported() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let error = executor.execute(&candidate("SELECT missing FROM sales_q1"), &CancelToken::new()).unwrap_err();
        assert!(matches!(error, ExecutionError::Failed { message } if message.contains("missing")));
    }

    #[test]
    fn row_cap() {
        let store = store();
        let config = ExecutionConfig {
            row_cap: 2,
            ..ExecutionConfig::default()
        };
        let executor = QueryExecutor::new(&store, &config);
        let error = executor.execute(&candidate("SELECT * FROM sales_q1"), &CancelToken::new()).unwrap_err();
        assert_eq!(error, ExecutionError::ResultTooLarge { cap: 2 });
        let result = executor.execute(&candidate("SELECT * FROM sales_q1 LIMIT 2"), &CancelToken::new()).unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn slow_queries_time_out() {
        let store = store();
        let config = ExecutionConfig {
            timeout_ms: 50,
            ..ExecutionConfig::default()
        };
        let executor = QueryExecutor::new(&store, &config);
        let slow = candidate("SELECT sum(a.range * b.range) FROM range(200000) a, range(200000) b");
        let error = executor.execute(&slow, &CancelToken::new()).unwrap_err();
        assert_eq!(error, ExecutionError::Timeout { timeout: Duration::from_millis(50) });
    }

    #[test]
    fn cancelled_queries_stop() {
        let store = store();
        let executor = QueryExecutor::new(&store, &ExecutionConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let error = executor.execute(&candidate("SELECT 1"), &cancel).unwrap_err();
        assert_eq!(error, ExecutionError::Cancelled);
    }
}
