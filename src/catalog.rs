//! Versioned catalog of ingested table structure.
//!
//! The catalog records what exists in the store: table names, columns, types
//! and a few sample values per column. It never holds row data.

use crate::database::column::ColumnType;
use serde::Serialize;
use std::fmt::Write;
use thiserror::Error;

/// Number of representative sample values kept per column.
pub const SAMPLE_SIZE: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Table name '{name}' is already used by sheet '{sheet}' of '{file}'")]
    DuplicateName { name: String, file: String, sheet: String },
}

/// Identifies an input sheet: the file it came from and its name in that file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SheetKey {
    pub file: String,
    pub sheet: String,
}

impl SheetKey {
    pub fn new(file: &str, sheet: &str) -> Self {
        SheetKey {
            file: file.to_owned(),
            sheet: sheet.to_owned(),
        }
    }
}

/// A column of a normalized table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnDef {
    /// SQL-safe column name
    pub name: String,
    /// Header label as written in the sheet
    pub label: String,
    pub kind: ColumnType,
    pub nullable: bool,
    /// Up to [`SAMPLE_SIZE`] distinct values, rendered as text
    pub samples: Vec<String>,
}

/// Catalog entry: a normalized table without its rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub source: SheetKey,
    pub columns: Vec<ColumnDef>,
    pub row_count: usize,
}

impl TableSchema {
    /// Looks a column up by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Describes the table for a prompt.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Table: {} (sheet \"{}\" of {}, {} rows)\nColumns:\n",
            self.name, self.source.sheet, self.source.file, self.row_count
        );
        for column in &self.columns {
            let _ = write!(text, "- {} ({}", column.name, column.kind.as_str());
            if column.nullable {
                text.push_str(", nullable");
            }
            text.push(')');
            if !column.samples.is_empty() {
                let samples: Vec<String> = column.samples.iter().map(|sample| format!("{sample:?}")).collect();
                let _ = write!(text, " e.g. {}", samples.join(", "));
            }
            text.push('\n');
        }
        text
    }
}

/// Ordered table metadata (ingestion order) plus a version number.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SchemaCatalog {
    version: u64,
    tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(version: u64) -> Self {
        SchemaCatalog {
            version,
            tables: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Adds a table, or replaces the entry registered for the same input sheet.
    ///
    /// Returns the replaced entry. A name already held by a different sheet
    /// is rejected rather than merged.
    pub fn register(&mut self, table: TableSchema) -> Result<Option<TableSchema>, CatalogError> {
        if let Some(other) = self
            .tables
            .iter()
            .find(|other| other.name == table.name && other.source != table.source)
        {
            return Err(CatalogError::DuplicateName {
                name: table.name.to_owned(),
                file: other.source.file.to_owned(),
                sheet: other.source.sheet.to_owned(),
            });
        }
        match self.tables.iter_mut().find(|other| other.source == table.source) {
            Some(entry) => Ok(Some(std::mem::replace(entry, table))),
            None => {
                self.tables.push(table);
                Ok(None)
            }
        }
    }

    /// All tables in ingestion order.
    pub fn snapshot(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Columns of a table.
    pub fn describe(&self, name: &str) -> Result<&[ColumnDef], CatalogError> {
        self.table(name)
            .map(|table| table.columns.as_slice())
            .ok_or_else(|| CatalogError::UnknownTable(name.to_owned()))
    }

    /// Looks a table up by name, ignoring case.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Name under which an input sheet is registered.
    pub fn name_for(&self, source: &SheetKey) -> Option<&str> {
        self.tables
            .iter()
            .find(|table| &table.source == source)
            .map(|table| table.name.as_str())
    }

    /// The `k` most recently ingested tables, newest first.
    pub fn most_recent(&self, k: usize) -> Vec<&TableSchema> {
        self.tables.iter().rev().take(k).collect()
    }

    /// Describes every table for a prompt.
    pub fn render(&self) -> String {
        self.tables.iter().map(TableSchema::render).collect::<Vec<_>>().join("\n")
    }
}
