use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::RawSheet;
use crate::value::CellValue;

/// Collects the sparse cells of one worksheet and lays them out as rows.
///
/// Rows start at the first non-empty row (the header) and at the leftmost
/// non-empty column. Trailing nulls are not stored.
pub(crate) struct SheetBuilder {
    source: String,
    name: String,
    /// Non-null cells as (row, col, value), in reading order
    cells: Vec<(usize, usize, CellValue)>,
    /// Maximum number of data rows after the header
    limit: Option<usize>,
    skip_empty_rows: bool,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
}

impl SheetBuilder {
    pub(crate) fn new(source: &str, name: &str, criteria: &Criteria) -> Self {
        Self {
            source: source.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            limit: criteria.rows_limit,
            skip_empty_rows: criteria.skip_empty_rows,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
        }
    }

    /// Returns true once `row` lies beyond the header plus the row limit.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.row_lower_bound
            .zip(self.limit)
            .map(|(row_lower_bound, limit)| row_lower_bound + limit < row)
            .unwrap_or(false)
    }

    /// Adds a cell; null cells only matter through the bounds of their neighbours.
    pub(crate) fn push(&mut self, row: usize, col: usize, value: CellValue) {
        if value.is_null() {
            return;
        }
        self.update_bound(row, col);
        self.cells.push((row, col, value));
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
    }

    /// Lays the cells out as rows, header first.
    ///
    /// Rows are built from the cells actually present and end at their last
    /// non-null cell, so memory follows the cells rather than the bounding box.
    pub(crate) fn finish(self, sheet_count: usize) -> RawSheet {
        let mut sheet = RawSheet::new(&self.source, &self.name, Vec::new());
        sheet.sheet_count = sheet_count;
        let (Some(row_lower), Some(row_upper), Some(col_lower)) =
            (self.row_lower_bound, self.row_upper_bound, self.col_lower_bound)
        else {
            return sheet;
        };
        let row_upper = match self.limit {
            Some(limit) => row_upper.min(row_lower + limit),
            None => row_upper,
        };

        let mut cells = self.cells;
        cells.retain(|(row, _, _)| *row <= row_upper);
        cells.sort_by_key(|(row, col, _)| (*row, *col));

        let mut rows: Vec<Vec<CellValue>> = Vec::new();
        let mut current: Option<usize> = None;
        for (row, col, value) in cells {
            if current != Some(row) {
                if let (Some(previous), false) = (current, self.skip_empty_rows) {
                    rows.extend(std::iter::repeat_with(Vec::new).take(row - previous - 1));
                }
                rows.push(Vec::new());
                current = Some(row);
            }
            if let Some(values) = rows.last_mut() {
                let index = col - col_lower;
                if values.len() <= index {
                    values.resize(index + 1, CellValue::Null);
                }
                values[index] = value;
            }
        }
        sheet.rows = rows;
        sheet
    }
}
