use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::fmt::Display;

/// Date-time layouts accepted as ISO-like text, tried in order.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts accepted as ISO-like text.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// A single cell of spreadsheet input or of a query result.
///
/// Raw cells arrive from the readers in whatever shape the file stored them;
/// the normalizer widens every column to one of these variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Reads the value as an integer. Reals qualify only without a fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(value) => Some(*value),
            CellValue::Real(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => Some(*value as i64),
            CellValue::Text(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Reads the value as a finite decimal number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            CellValue::Integer(value) => Some(*value as f64),
            CellValue::Real(value) if value.is_finite() => Some(*value),
            CellValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite()),
            _ => None,
        }
    }

    /// Reads the value as a date-time; dates land on midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(date) => Some(date.and_time(NaiveTime::MIN)),
            CellValue::DateTime(datetime) => Some(*datetime),
            CellValue::Text(text) => parse_iso_datetime(text),
            _ => None,
        }
    }

    /// Reads the value as a boolean: native booleans, `true`/`false` text and `0`/`1`.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(value) => Some(*value),
            CellValue::Integer(0) => Some(false),
            CellValue::Integer(1) => Some(true),
            CellValue::Real(value) if *value == 0.0 => Some(false),
            CellValue::Real(value) if *value == 1.0 => Some(true),
            CellValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(value) => write!(f, "{value}"),
            CellValue::Real(value) => write!(f, "{value}"),
            CellValue::Text(value) => write!(f, "{value}"),
            CellValue::Boolean(value) => write!(f, "{value}"),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            CellValue::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Parses ISO-like date or date-time text, including RFC 3339 offsets.
pub(crate) fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.len() < 8 || !text.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|datetime| datetime.naive_local())
        })
}
