use thiserror::Error;

/// Main error type for rusty_ask.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum RustyAskError {
    #[error("{0}")]
    WithContextError(String),

    #[error("No data has been ingested yet")]
    NoData,

    #[error("Request cancelled")]
    Cancelled,

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    // Third-party library errors
    #[error("{0}")]
    DuckDBError(#[from] duckdb::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    UnifiedReaderError(#[from] crate::helpers::reader::UnifiedReaderError),

    // Pipeline errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    IngestError(#[from] crate::ingest::IngestError),

    #[error("{0}")]
    CatalogError(#[from] crate::catalog::CatalogError),

    #[error("{0}")]
    SynthesisError(#[from] crate::query::synthesizer::SynthesisError),

    #[error("{0}")]
    SummaryError(#[from] crate::summarizer::SummaryError),
}

impl RustyAskError {
    /// Returns the message shown to the person who asked the question.
    ///
    /// Distinguishes a missing dataset, a question no valid query could be
    /// produced for, a query that ran but whose answer failed, and cancellation.
    pub fn user_message(&self) -> String {
        use crate::query::synthesizer::SynthesisError;
        match self {
            RustyAskError::NoData => {
                "No data has been ingested yet. Load one or more spreadsheet files before asking questions.".to_owned()
            }
            RustyAskError::Cancelled | RustyAskError::SynthesisError(SynthesisError::Cancelled) => {
                "The request was cancelled.".to_owned()
            }
            RustyAskError::SynthesisError(SynthesisError::Exhausted { attempts, last_error, .. }) => format!(
                "Could not generate a valid query for this question after {attempts} attempts (last error: {last_error}). Try rephrasing it."
            ),
            RustyAskError::SummaryError(error) => {
                format!("The query executed, but the answer could not be written: {error}")
            }
            error => format!("The question could not be answered: {error}"),
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, RustyAskError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| RustyAskError::WithContextError(format!("{}: {}", message, e)))
    }
}
