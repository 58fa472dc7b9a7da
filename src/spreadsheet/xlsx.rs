use crate::error::RustyAskError;
use crate::helpers::cfb::Cfb;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::SheetBuilder;
use crate::spreadsheet::RawSheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::warn;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufReader;
use zip::read::ZipFile;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_RELATIONSHIP: &[u8] = b"Relationship";        // Package relationship
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");     // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");       // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");     // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");            // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");      // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");          // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                     // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");                // Worksheet definition
const TAG_ROW: QName = QName(b"row");                    // Row in worksheet
const TAG_CELL: QName = QName(b"c");                     // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");           // Inline string value
const TAG_VALUE: QName = QName(b"v");                    // Cell value content

/// An Excel XLSX/XLSM workbook
pub(crate) struct XlsxSpreadsheet {
    /// File name of the spreadsheet
    name: String,
    /// ZIP archive containing the workbook parts
    zip: ZipArchive<UnifiedReader>,
    /// Cell types indexed by style id
    number_formats: Vec<CellType>,
    /// Worksheets as (name, zip_path) pairs in workbook order
    sheets: Vec<(String, String)>,
    /// Shared string table
    shared_strings: Vec<String>,
}

impl XlsxSpreadsheet {
    /// Opens a workbook and loads its sheet list, styles and shared strings
    pub(crate) fn open(file_name: &str) -> Result<XlsxSpreadsheet, RustyAskError> {
        let mut reader = UnifiedReader::new(file_name)?;
        if is_password_protected(&mut reader) {
            Err(SpreadsheetError::PasswordProtected(file_name.to_owned()))?;
        }

        let mut zip = ZipArchive::new(reader)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::Empty(file_name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
            shared_strings,
        })
    }

    /// Reads one worksheet part into a raw sheet
    fn read_sheet(&mut self, sheet_name: &str, zip_path: &str, criteria: &Criteria) -> Result<RawSheet, RustyAskError> {
        let sheet_count = self.sheets.len();
        let mut sheet = SheetBuilder::new(&self.name, sheet_name, criteria);
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut reader = self
            .zip
            .xml_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPart(self.name.to_owned(), zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(index) = event.get_attribute_value("r")?.and_then(|r| r.parse::<usize>().ok()) {
                    row_count = index.saturating_sub(1);
                }
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                if sheet.after_row_upper_bound(row) {
                    break;
                }
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
                value.clear();
            }
            Event::Start(event) if event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if kind == CellType::Error {
                    warn!(
                        "Error value '{}' at {}!{}!{} read as null",
                        value, self.name, sheet_name, index_to_reference(row, col)
                    );
                } else if !value.is_empty() {
                    match kind.to_value(&value, &self.shared_strings) {
                        Ok(cell) => sheet.push(row, col, criteria.clean(cell)),
                        Err(message) => Err(SpreadsheetError::CellValue {
                            file: self.name.to_owned(),
                            sheet: sheet_name.to_owned(),
                            reference: index_to_reference(row, col),
                            message,
                        })?,
                    }
                }
                kind = CellType::default();
                value.clear();
            }
        });
        Ok(sheet.finish(sheet_count))
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<RawSheet>, RustyAskError> {
        let selected: Vec<(String, String)> = self
            .sheets
            .iter()
            .filter(|(name, _)| criteria.accept(name))
            .cloned()
            .collect();
        let mut sheets = Vec::with_capacity(selected.len());
        for (sheet_name, zip_path) in selected {
            sheets.push(self.read_sheet(&sheet_name, &zip_path, criteria)?);
        }
        Ok(sheets)
    }
}

/// Loads worksheet relationships as id → zip path
fn load_relationships(zip: &mut ZipArchive<UnifiedReader>, path: &str) -> Result<HashMap<String, String>, RustyAskError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::MissingPart(String::new(), path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Loads the sheet list from `workbook.xml` and whether the 1904 date system is used
fn load_workbook(zip: &mut ZipArchive<UnifiedReader>) -> Result<(Vec<(String, String)>, bool), RustyAskError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::MissingPart(String::new(), "xl/workbook.xml".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Maps style ids to cell types from `styles.xml`
fn load_number_formats(zip: &mut ZipArchive<UnifiedReader>, is_1904: bool) -> Result<Vec<CellType>, RustyAskError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    Ok(format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect())
}

/// Loads the whole shared string table
fn load_shared_strings(zip: &mut ZipArchive<UnifiedReader>) -> Result<Vec<String>, RustyAskError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Reads text up to `end_tag`, skipping phonetic runs.
/// `is_text_content` treats character data as text without an enclosing `<t>`.
fn read_string_value(
    reader: &mut XmlReader<BufReader<ZipFile<'_, UnifiedReader>>>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, RustyAskError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

/// Normalizes a relationship target to a path inside the archive
fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_owned()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Encrypted workbooks are compound files holding an `EncryptedPackage` stream
fn is_password_protected(reader: &mut UnifiedReader) -> bool {
    Cfb::new(reader).map(|cfb| cfb.exists("EncryptedPackage")).unwrap_or(false)
}
