use crate::catalog::ColumnDef;
use crate::catalog::SchemaCatalog;
use crate::catalog::SheetKey;
use crate::catalog::TableSchema;
use crate::catalog::SAMPLE_SIZE;
use crate::database::column::ColumnType;
use crate::helpers::reader::file_extension;
use crate::helpers::reader::file_stem;
use crate::ingest::names::dedupe_names;
use crate::ingest::names::is_default_sheet_name;
use crate::ingest::names::normalize_identifier;
use crate::ingest::names::unique_name;
use crate::ingest::IngestError;
use crate::spreadsheet::RawSheet;
use crate::value::CellValue;

/// Longest sample value kept in the catalog, in characters.
const SAMPLE_LENGTH: usize = 48;

/// A sheet converted to a relational table, rows coerced to the column types.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTable {
    pub schema: TableSchema,
    pub rows: Vec<Vec<CellValue>>,
}

/// Converts a raw sheet into a table whose name is unique within `catalog`.
///
/// The first row is the header. Repeated header names are numbered in
/// encounter order: the first keeps the bare name, later ones get `_1`, `_2`
/// and so on. Each column gets the narrowest type all of its values fit;
/// every value is then converted to that type.
pub fn normalize(sheet: RawSheet, catalog: &SchemaCatalog) -> Result<NormalizedTable, IngestError> {
    let unreadable = |reason: &str| IngestError::UnreadableSheet {
        file: sheet.source.to_owned(),
        sheet: sheet.sheet.to_owned(),
        reason: reason.to_owned(),
    };
    let width = sheet.width();
    let header = match sheet.rows.first() {
        Some(header) if header.iter().any(|value| !value.is_null()) => header,
        Some(_) | None => return Err(unreadable("no header row")),
    };
    if width == 0 {
        return Err(unreadable("no columns"));
    }

    let labels: Vec<String> = (0..width)
        .map(|index| match header.get(index) {
            Some(CellValue::Null) | None => String::new(),
            Some(value) => value.to_string().trim().to_owned(),
        })
        .collect();
    let names = dedupe_names(
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| normalize_identifier(label, "c_", &format!("column_{}", index + 1)))
            .collect(),
    );

    let data: Vec<&Vec<CellValue>> = sheet.rows.iter().skip(1).collect();
    let null = CellValue::Null;
    let mut columns = Vec::with_capacity(width);
    for (index, (name, label)) in names.into_iter().zip(labels).enumerate() {
        let values: Vec<&CellValue> = data.iter().map(|row| row.get(index).unwrap_or(&null)).collect();
        let kind = ColumnType::detect(values.iter().copied());
        let nullable = data.is_empty() || values.iter().any(|value| value.is_null());
        let mut samples: Vec<String> = Vec::with_capacity(SAMPLE_SIZE);
        for value in values.iter().filter(|value| !value.is_null()) {
            let sample: String = kind.coerce(value).to_string().chars().take(SAMPLE_LENGTH).collect();
            if !samples.contains(&sample) {
                samples.push(sample);
                if samples.len() == SAMPLE_SIZE {
                    break;
                }
            }
        }
        columns.push(ColumnDef {
            name,
            label,
            kind,
            nullable,
            samples,
        });
    }

    let rows: Vec<Vec<CellValue>> = data
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(index, column)| column.kind.coerce(row.get(index).unwrap_or(&null)))
                .collect()
        })
        .collect();

    let source = SheetKey::new(&sheet.source, &sheet.sheet);
    let name = resolve_table_name(&sheet, &source, catalog);
    Ok(NormalizedTable {
        schema: TableSchema {
            name,
            source,
            columns,
            row_count: rows.len(),
        },
        rows,
    })
}

/// Picks the table name for a sheet.
///
/// A sheet already registered keeps its name. Otherwise the name derives from
/// the sheet name, the file stem, or both, and is suffixed until unique.
fn resolve_table_name(sheet: &RawSheet, source: &SheetKey, catalog: &SchemaCatalog) -> String {
    if let Some(name) = catalog.name_for(source) {
        return name.to_owned();
    }
    let stem = file_stem(&sheet.source);
    let label = if matches!(file_extension(&sheet.source).as_str(), "csv" | "tsv") {
        stem
    } else if sheet.sheet_count > 1 {
        format!("{stem}_{}", sheet.sheet)
    } else if is_default_sheet_name(&sheet.sheet) && !stem.trim().is_empty() {
        stem
    } else {
        sheet.sheet.to_owned()
    };
    let base = normalize_identifier(&label, "t_", "sheet");
    unique_name(&base, |candidate| catalog.contains_name(candidate))
}
