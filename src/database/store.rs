use crate::database::column::ColumnType;
use crate::ingest::normalizer::NormalizedTable;
use crate::ingest::IngestError;
use crate::value::CellValue;
use duckdb::params_from_iter;
use duckdb::types::Value;
use duckdb::Connection;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

/// The DuckDB database holding one physical table per normalized sheet.
///
/// Callers never share the root connection: every unit of work runs on a
/// clone obtained from [`Store::connection`].
pub struct Store {
    connection: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    pub fn open_in_memory() -> Result<Store, duckdb::Error> {
        Ok(Store {
            connection: Mutex::new(Connection::open_in_memory()?),
            path: None,
        })
    }

    /// Opens an existing database file, creating it when absent.
    pub fn open(path: &Path) -> Result<Store, duckdb::Error> {
        Ok(Store {
            connection: Mutex::new(Connection::open(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an empty database file, discarding whatever was at `path`.
    pub fn create(path: &Path) -> Result<Store, IngestError> {
        remove_database_files(path)?;
        Ok(Store::open(path)?)
    }

    /// Database file, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A new connection to the same database.
    pub fn connection(&self) -> Result<Connection, duckdb::Error> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner).try_clone()
    }

    pub fn close(self) -> Result<(), duckdb::Error> {
        let connection = self.connection.into_inner().unwrap_or_else(PoisonError::into_inner);
        connection.close().map_err(|(_, e)| e)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, duckdb::Error> {
        let count: i64 = self.connection()?.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE lower(table_name) = lower(?)",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Creates the physical table for `table` and inserts its rows in one transaction.
    ///
    /// An existing table of the same name is dropped when `replace` is set and
    /// is a conflict otherwise.
    pub fn write_table(&self, table: &NormalizedTable, replace: bool) -> Result<(), IngestError> {
        let schema = &table.schema;
        let exists = self.table_exists(&schema.name)?;
        if exists && !replace {
            return Err(IngestError::IngestionConflict(schema.name.to_owned()));
        }

        let name = quote_identifier(&schema.name);
        let definitions: Vec<String> = schema
            .columns
            .iter()
            .map(|column| format!("{} {}", quote_identifier(&column.name), column.kind.sql_type()))
            .collect();
        let placeholders: Vec<&str> = schema
            .columns
            .iter()
            .map(|column| match column.kind {
                ColumnType::Date => "CAST(? AS DATE)",
                ColumnType::DateTime => "CAST(? AS TIMESTAMP)",
                _ => "?",
            })
            .collect();

        let mut connection = self.connection()?;
        let transaction = connection.transaction()?;
        if exists {
            transaction.execute_batch(&format!("DROP TABLE {name}"))?;
        }
        transaction.execute_batch(&format!("CREATE TABLE {name} ({})", definitions.join(", ")))?;
        if !table.rows.is_empty() {
            let mut statement = transaction.prepare(&format!("INSERT INTO {name} VALUES ({})", placeholders.join(", ")))?;
            for row in &table.rows {
                statement.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }
        transaction.commit()?;
        Ok(())
    }

    /// Checks that `target` and its write-ahead log are regular files or absent.
    ///
    /// Meant to run while the store at `target` is still open, so a path that
    /// could never be replaced fails before anything is closed.
    pub fn check_target(target: &Path) -> Result<(), IngestError> {
        for file in [target.to_path_buf(), wal_path(target)] {
            if let Ok(metadata) = std::fs::metadata(&file) {
                if !metadata.is_file() {
                    return Err(IngestError::InvalidDatabasePath(file.display().to_string()));
                }
            }
        }
        Ok(())
    }

    /// Replaces the database at `target` with this store's file and reopens it there.
    ///
    /// The file is renamed over `target`, which holds either the old or the new
    /// database at every point. On failure `target` is left as it was and the
    /// staging files are removed. In-memory stores are returned unchanged.
    pub fn promote(self, target: &Path) -> Result<Store, IngestError> {
        let Some(path) = self.path.clone() else {
            return Ok(self);
        };
        let moved = self
            .close()
            .map_err(IngestError::from)
            .and_then(|()| replace_files(&path, target).map_err(IngestError::from));
        if let Err(e) = moved {
            if let Err(cleanup) = remove_database_files(&path) {
                log::warn!("Failed to remove staging database {}: {cleanup}", path.display());
            }
            return Err(e);
        }
        Ok(Store::open(target)?)
    }
}

/// Moves a closed database and its write-ahead log from `source` to `target`.
///
/// A stale log at `target` goes first; the database file itself moves last in
/// one rename, so a failure before that leaves `target` unchanged.
fn replace_files(source: &Path, target: &Path) -> std::io::Result<()> {
    let target_wal = wal_path(target);
    remove_if_exists(&target_wal)?;
    let source_wal = wal_path(source);
    let moved_wal = source_wal.exists();
    if moved_wal {
        std::fs::rename(&source_wal, &target_wal)?;
    }
    if let Err(e) = std::fs::rename(source, target) {
        if moved_wal {
            remove_if_exists(&target_wal)?;
        }
        return Err(e);
    }
    Ok(())
}

/// Location of the scratch database an ingestion builds before it is promoted.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".staging");
    PathBuf::from(staging)
}

fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_owned();
    wal.push(".wal");
    PathBuf::from(wal)
}

/// Removes a database file and its write-ahead log if present.
pub(crate) fn remove_database_files(path: &Path) -> std::io::Result<()> {
    remove_if_exists(path)?;
    remove_if_exists(&wal_path(path))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Integer(value) => Value::BigInt(*value),
        CellValue::Real(value) => Value::Double(*value),
        CellValue::Text(value) => Value::Text(value.to_owned()),
        CellValue::Boolean(value) => Value::Boolean(*value),
        CellValue::Date(value) => Value::Text(value.format("%Y-%m-%d").to_string()),
        CellValue::DateTime(value) => Value::Text(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDef;
    use crate::catalog::SheetKey;
    use crate::catalog::TableSchema;
    use chrono::NaiveDate;

    fn column(name: &str, kind: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_owned(),
            label: name.to_owned(),
            kind,
            nullable: true,
            samples: Vec::new(),
        }
    }

    fn orders() -> NormalizedTable {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        NormalizedTable {
            schema: TableSchema {
                name: "orders".to_owned(),
                source: SheetKey::new("orders.csv", "orders"),
                columns: vec![
                    column("id", ColumnType::Integer),
                    column("amount", ColumnType::Real),
                    column("paid", ColumnType::Boolean),
                    column("ship_day", ColumnType::Date),
                    column("shipped_at", ColumnType::DateTime),
                    column("note", ColumnType::Text),
                ],
                row_count: 2,
            },
            rows: vec![
                vec![
                    CellValue::Integer(1),
                    CellValue::Real(9.5),
                    CellValue::Boolean(true),
                    CellValue::Date(day),
                    CellValue::DateTime(day.and_hms_opt(10, 30, 0).unwrap()),
                    CellValue::Text("it's \"quoted\"".to_owned()),
                ],
                vec![CellValue::Integer(2), CellValue::Null, CellValue::Null, CellValue::Null, CellValue::Null, CellValue::Null],
            ],
        }
    }

    #[test]
    fn write_and_read_back() {
        let store = Store::open_in_memory().unwrap();
        store.write_table(&orders(), false).unwrap();
        assert!(store.table_exists("ORDERS").unwrap());

        let connection = store.connection().unwrap();
        let (amount, day, at): (f64, String, String) = connection
            .query_row(
                "SELECT amount, CAST(ship_day AS VARCHAR), CAST(shipped_at AS VARCHAR) FROM orders WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((amount, day.as_str(), at.as_str()), (9.5, "2024-03-01", "2024-03-01 10:30:00"));
        let nulls: i64 = connection
            .query_row("SELECT count(*) FROM orders WHERE amount IS NULL AND paid IS NULL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn existing_tables_conflict_unless_replaced() {
        let store = Store::open_in_memory().unwrap();
        store.write_table(&orders(), false).unwrap();
        assert!(matches!(store.write_table(&orders(), false), Err(IngestError::IngestionConflict(_))));
        store.write_table(&orders(), true).unwrap();
        let count: i64 = store
            .connection()
            .unwrap()
            .query_row("SELECT count(*) FROM orders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_identifier("sales_q1"), "\"sales_q1\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn staging_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.duckdb");
        let old = Store::create(&target).unwrap();
        old.close().unwrap();

        let staging = Store::create(&staging_path(&target)).unwrap();
        staging.write_table(&orders(), false).unwrap();
        let promoted = staging.promote(&target).unwrap();
        assert_eq!(promoted.path(), Some(target.as_path()));
        assert!(promoted.table_exists("orders").unwrap());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn failed_promotion_keeps_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.duckdb");
        let old = Store::create(&target).unwrap();
        old.write_table(&orders(), false).unwrap();
        old.close().unwrap();

        let mut invoices = orders();
        invoices.schema.name = "invoices".to_owned();
        let staging = Store::create(&staging_path(&target)).unwrap();
        staging.write_table(&invoices, false).unwrap();

        std::fs::create_dir(wal_path(&target)).unwrap();
        assert!(matches!(Store::check_target(&target), Err(IngestError::InvalidDatabasePath(_))));
        assert!(matches!(staging.promote(&target), Err(IngestError::Io(_))));
        assert!(target.exists());
        assert!(!staging_path(&target).exists());

        std::fs::remove_dir(wal_path(&target)).unwrap();
        Store::check_target(&target).unwrap();
        let reopened = Store::open(&target).unwrap();
        assert!(reopened.table_exists("orders").unwrap());
        assert!(!reopened.table_exists("invoices").unwrap());
    }
}
