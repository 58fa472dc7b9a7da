use crate::value::CellValue;
use glob::Pattern;
use std::collections::HashSet;

/// Criteria for selecting sheets and cleaning cells while reading.
#[derive(Clone, Debug)]
pub struct Criteria {
    /// Sheet name patterns; `None` accepts every sheet.
    pub sheet_name_patterns: Option<Vec<Pattern>>,

    /// Maximum number of data rows to read per sheet.
    pub rows_limit: Option<usize>,

    /// Text that reads as null, compared after trimming (default: empty string).
    pub nulls: HashSet<String>,

    /// Drop data rows where every column is empty.
    pub skip_empty_rows: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria {
            sheet_name_patterns: None,
            rows_limit: None,
            nulls: HashSet::from([String::new()]),
            skip_empty_rows: true,
        }
    }
}

impl Criteria {
    /// Builds criteria from sheet name glob patterns; an empty list accepts every sheet.
    pub fn new(sheet_patterns: &[String], nulls: &[String], rows_limit: Option<usize>, skip_empty_rows: bool) -> Result<Self, glob::PatternError> {
        let sheet_name_patterns = if sheet_patterns.is_empty() {
            None
        } else {
            Some(sheet_patterns.iter().map(|pattern| Pattern::new(pattern)).collect::<Result<Vec<_>, _>>()?)
        };
        Ok(Criteria {
            sheet_name_patterns,
            rows_limit,
            nulls: nulls.iter().map(|null| null.trim().to_owned()).collect(),
            skip_empty_rows,
        })
    }

    /// Checks if a sheet name matches the criteria patterns.
    pub fn accept(&self, sheet_name: &str) -> bool {
        match &self.sheet_name_patterns {
            Some(patterns) => patterns.iter().any(|pattern| pattern.matches(sheet_name)),
            None => true,
        }
    }

    /// Replaces null literals with `Null`.
    pub(crate) fn clean(&self, value: CellValue) -> CellValue {
        match value {
            CellValue::Text(text) if self.nulls.contains(text.trim()) => CellValue::Null,
            value => value,
        }
    }
}
