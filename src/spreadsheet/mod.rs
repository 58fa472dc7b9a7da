//! # Spreadsheet readers
//!
//! Opens workbooks and delimited files from local paths or remote URLs and
//! turns every selected sheet into a [`RawSheet`]: rows of [`CellValue`]s with
//! the header row first. Typing beyond what the file itself records is left
//! to the normalizer.
pub(crate) mod cell;
pub mod criteria;
mod delimited;
mod reference;
pub(crate) mod sheet;
mod xlsx;

use crate::error::RustyAskError;
use crate::helpers::reader::file_extension;
use crate::spreadsheet::delimited::CsvSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use crate::value::CellValue;
pub use criteria::Criteria;
use thiserror::Error;

/// Errors raised while opening or reading a spreadsheet file.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported spreadsheet format '{0}'")]
    UnsupportedFormat(String),

    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtected(String),

    #[error("Spreadsheet '{0}' contains no sheets")]
    Empty(String),

    #[error("Missing part '{1}' in spreadsheet '{0}'")]
    MissingPart(String, String),

    #[error("Invalid cell value at {file}!{sheet}!{reference}: {message}")]
    CellValue {
        file: String,
        sheet: String,
        reference: String,
        message: String,
    },
}

/// One sheet as read from its file, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSheet {
    /// File the sheet came from (path or URL)
    pub source: String,
    /// Sheet name inside the file
    pub sheet: String,
    /// Number of sheets in the source workbook
    pub sheet_count: usize,
    /// Header row first, then data rows
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(source: &str, sheet: &str, rows: Vec<Vec<CellValue>>) -> Self {
        RawSheet {
            source: source.to_owned(),
            sheet: sheet.to_owned(),
            sheet_count: 1,
            rows,
        }
    }

    /// Widest row, header included
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// A spreadsheet file opened for reading.
pub trait Spreadsheet {
    /// Returns all sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads every sheet accepted by the criteria
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<RawSheet>, RustyAskError>;
}

/// File extensions [`open_spreadsheet`] understands.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "csv", "tsv"];

/// Opens a spreadsheet, dispatching on the file extension.
pub fn open_spreadsheet(file_name: &str) -> Result<Box<dyn Spreadsheet>, RustyAskError> {
    match file_extension(file_name).as_str() {
        "xlsx" | "xlsm" => Ok(Box::new(XlsxSpreadsheet::open(file_name)?)),
        "csv" => Ok(Box::new(CsvSpreadsheet::open(file_name, b',')?)),
        "tsv" => Ok(Box::new(CsvSpreadsheet::open(file_name, b'\t')?)),
        _ => Err(SpreadsheetError::UnsupportedFormat(file_name.to_owned()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_formats() {
        let error = open_spreadsheet("notes.txt").err().unwrap();
        assert!(matches!(error, RustyAskError::SpreadsheetError(SpreadsheetError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_files_fail() {
        assert!(open_spreadsheet("does/not/exist.csv").is_err());
    }

    #[test]
    fn width_counts_ragged_rows() {
        let sheet = RawSheet::new("a.csv", "a", vec![vec![CellValue::Null], vec![CellValue::Null, CellValue::Integer(1)]]);
        assert_eq!(sheet.width(), 2);
    }
}
