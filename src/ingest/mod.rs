//! # Ingestion
//!
//! Finds the input files, reads their sheets, normalizes each sheet into a
//! relational table and writes it to the store. A table is registered in the
//! catalog only after it has been normalized and written.
pub mod discovery;
pub(crate) mod names;
pub mod normalizer;

use crate::catalog::CatalogError;
use crate::catalog::SchemaCatalog;
use crate::catalog::TableSchema;
use crate::database::store::Store;
use crate::error::ResultMessage;
use crate::error::RustyAskError;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::Criteria;
use crate::spreadsheet::RawSheet;
use normalizer::normalize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Cannot read sheet '{sheet}' of '{file}': {reason}")]
    UnreadableSheet { file: String, sheet: String, reason: String },

    #[error("Table '{0}' already exists in the store but not in the catalog")]
    IngestionConflict(String),

    #[error("No spreadsheet files match '{0}'")]
    NoInputs(String),

    #[error("Database path '{0}' is not a regular file")]
    InvalidDatabasePath(String),

    #[error("{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("{0}")]
    Store(#[from] duckdb::Error),

    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Reads every sheet accepted by `criteria` from the given inputs.
///
/// Inputs may be files, directories, glob patterns or URLs; see
/// [`discovery::discover`].
pub fn read_inputs<S: AsRef<str>>(inputs: &[S], criteria: &Criteria) -> Result<Vec<RawSheet>, RustyAskError> {
    let files = discovery::discover(inputs)?;
    let mut sheets = Vec::new();
    for file in &files {
        let mut spreadsheet = open_spreadsheet(file).with_prefix(file)?;
        let read = spreadsheet.read_sheets(criteria).with_prefix(file)?;
        if read.is_empty() {
            log::warn!("No sheets selected from {file} (sheets: {})", spreadsheet.sheet_names().join(", "));
        }
        sheets.extend(read);
    }
    Ok(sheets)
}

/// Normalizes one sheet, writes it to the store and registers it.
///
/// A sheet already in `catalog` replaces its previous table; a table present
/// in the store but unknown to the catalog is a conflict.
pub fn load_sheet(store: &Store, catalog: &mut SchemaCatalog, sheet: RawSheet) -> Result<TableSchema, IngestError> {
    let table = normalize(sheet, catalog)?;
    let replace = catalog.name_for(&table.schema.source).is_some();
    store.write_table(&table, replace)?;
    log::info!(
        "Loaded table {} from sheet '{}' of {} ({} rows, {} columns)",
        table.schema.name,
        table.schema.source.sheet,
        table.schema.source.file,
        table.schema.row_count,
        table.schema.columns.len()
    );
    catalog.register(table.schema.clone())?;
    Ok(table.schema)
}
