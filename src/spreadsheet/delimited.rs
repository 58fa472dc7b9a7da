use crate::error::RustyAskError;
use crate::helpers::reader::file_stem;
use crate::helpers::reader::UnifiedReader;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::SheetBuilder;
use crate::spreadsheet::RawSheet;
use crate::spreadsheet::Spreadsheet;
use crate::value::CellValue;
use encoding_rs::Encoding;
use encoding_rs::WINDOWS_1252;
use log::debug;
use std::borrow::Cow;

/// A delimited text file, read as a single sheet named after the file stem
pub(crate) struct CsvSpreadsheet {
    name: String,
    sheet_name: String,
    delimiter: u8,
    text: String,
}

impl CsvSpreadsheet {
    /// Reads and decodes the whole file
    pub(crate) fn open(file_name: &str, delimiter: u8) -> Result<CsvSpreadsheet, RustyAskError> {
        let bytes = UnifiedReader::new(file_name)?.into_bytes()?;
        Ok(CsvSpreadsheet {
            name: file_name.to_owned(),
            sheet_name: file_stem(file_name),
            delimiter,
            text: decode(&bytes, file_name).into_owned(),
        })
    }
}

impl Spreadsheet for CsvSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        vec![self.sheet_name.to_owned()]
    }

    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<RawSheet>, RustyAskError> {
        if !criteria.accept(&self.sheet_name) {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.text.as_bytes());
        let mut sheet = SheetBuilder::new(&self.name, &self.sheet_name, criteria);
        for (row, record) in reader.records().enumerate() {
            if sheet.after_row_upper_bound(row) {
                break;
            }
            for (col, field) in record?.iter().enumerate() {
                sheet.push(row, col, criteria.clean(CellValue::Text(field.to_owned())));
            }
        }
        Ok(vec![sheet.finish(1)])
    }
}

/// Decodes UTF-8 (with or without BOM) or UTF-16 with BOM; anything else is read as Windows-1252.
fn decode<'a>(bytes: &'a [u8], file_name: &str) -> Cow<'a, str> {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return text;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("'{file_name}' is not valid UTF-8, decoding as {}", WINDOWS_1252.name());
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bom_and_legacy_bytes() {
        assert_eq!(decode(b"\xEF\xBB\xBFRegion,Units", "a.csv"), "Region,Units");
        assert_eq!(decode(b"Caf\xE9", "b.csv"), "Café");
        assert_eq!(decode("Café".as_bytes(), "c.csv"), "Café");
        assert_eq!(decode(b"\xFF\xFEA\x00B\x00", "d.csv"), "AB");
    }

    #[test]
    fn reads_rows_as_text() {
        let mut spreadsheet = CsvSpreadsheet {
            name: "sales.csv".to_owned(),
            sheet_name: "sales".to_owned(),
            delimiter: b',',
            text: "Region,Units\nEast,10\n,\n\"West, Coast\",20\n".to_owned(),
        };
        assert_eq!(spreadsheet.sheet_names(), vec!["sales".to_owned()]);
        let sheets = spreadsheet.read_sheets(&Criteria::default()).unwrap();
        assert_eq!(sheets.len(), 1);
        let rows = &sheets[0].rows;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], CellValue::Text("West, Coast".to_owned()));
        assert_eq!(rows[1][1], CellValue::Text("10".to_owned()));
    }
}
