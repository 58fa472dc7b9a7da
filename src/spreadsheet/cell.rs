use crate::value::parse_iso_datetime;
use crate::value::CellValue;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;

/// How a raw worksheet cell is stored, derived from its `t` attribute and number format.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values such as `#DIV/0!`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => {
                Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 })
            }
            _ => None,
        }
    }

    /// Scans a custom number format code for date and time tokens,
    /// ignoring quoted literals, escapes and bracketed colors.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,
                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,
                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),
                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    fn is_1904(&self) -> bool {
        matches!(self, Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904)
    }

    /// Converts the raw cell text to a value.
    ///
    /// Shared string cells hold an index into `shared_strings`. Error cells
    /// and empty cells become `Null`.
    pub(crate) fn to_value(&self, raw: &str, shared_strings: &[String]) -> Result<CellValue, String> {
        let value = match self {
            CellType::Empty | CellType::Error => CellValue::Null,
            CellType::Boolean => CellValue::Boolean(raw.trim() == "1" || raw.trim().eq_ignore_ascii_case("true")),
            CellType::Number => to_number(raw)?,
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                let datetime = to_datetime(parse_serial(raw)?, self.is_1904())?;
                if datetime.time() == NaiveTime::MIN {
                    CellValue::Date(datetime.date())
                } else {
                    CellValue::DateTime(datetime)
                }
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                CellValue::DateTime(to_datetime(parse_serial(raw)?, self.is_1904())?)
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                let serial = parse_serial(raw)?;
                if serial >= 1.0 {
                    CellValue::DateTime(to_datetime(serial, self.is_1904())?)
                } else {
                    CellValue::Text(to_time_string(serial))
                }
            }
            CellType::IsoDateTime => {
                let datetime = parse_iso_datetime(raw).ok_or_else(|| format!("parse '{raw}' to date failed"))?;
                if raw.contains('T') && datetime.time() != NaiveTime::MIN {
                    CellValue::DateTime(datetime)
                } else {
                    CellValue::Date(datetime.date())
                }
            }
            CellType::InlineString => CellValue::Text(raw.to_owned()),
            CellType::SharedString => {
                let index = raw.trim().parse::<usize>().map_err(|_| format!("invalid shared string index '{raw}'"))?;
                let text = shared_strings
                    .get(index)
                    .ok_or_else(|| format!("shared string index {index} out of range"))?;
                CellValue::Text(text.to_owned())
            }
        };
        Ok(value)
    }
}

/// Numbers without a fractional part become integers.
fn to_number(raw: &str) -> Result<CellValue, String> {
    let raw = raw.trim();
    if let Ok(integer) = raw.parse::<i64>() {
        return Ok(CellValue::Integer(integer));
    }
    let number = raw.parse::<f64>().map_err(|_| format!("parse '{raw}' to number failed"))?;
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        Ok(CellValue::Integer(number as i64))
    } else {
        Ok(CellValue::Real(number))
    }
}

fn parse_serial(raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|serial| serial.is_finite() && *serial >= 0.0)
        .ok_or_else(|| format!("parse '{raw}' to date serial failed"))
}

/// Converts an Excel serial number to a date-time.
/// Serials before 1900-03-01 are shifted by one day for the Lotus 1-2-3 leap year bug.
pub(crate) fn to_datetime(serial: f64, is_1904: bool) -> Result<NaiveDateTime, String> {
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1_462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).ok_or("invalid epoch")?;
    let date = epoch
        .checked_add_signed(Duration::days(days + offset))
        .ok_or_else(|| format!("date serial {serial} out of range"))?;
    let milliseconds = (serial.fract() * 86_400_000f64).round() as i64;
    date.and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::milliseconds(milliseconds))
        .ok_or_else(|| format!("date serial {serial} out of range"))
}

/// Converts a day fraction to `HH:MM:SS`.
fn to_time_string(fraction: f64) -> String {
    let mut seconds = (fraction * 86_400f64).round() as i64;
    let hours = seconds / 3_600;
    seconds %= 3_600;
    format!("{hours:02}:{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("\"Days\" 0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]#,##0", false), CellType::Number);
    }

    #[test]
    fn builtin_formats() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("2", false), None);
    }

    #[test]
    fn serial_dates() {
        assert_eq!(to_datetime(45_292.0, false).unwrap().to_string(), "2024-01-01 00:00:00");
        assert_eq!(to_datetime(45_292.5, false).unwrap().to_string(), "2024-01-01 12:00:00");
        assert_eq!(to_datetime(1.0, false).unwrap().to_string(), "1900-01-01 00:00:00");
        assert_eq!(to_datetime(0.0, true).unwrap().to_string(), "1904-01-01 00:00:00");
    }

    #[test]
    fn values() {
        let strings = vec!["East".to_owned()];
        assert_eq!(CellType::Number.to_value("10", &strings).unwrap(), CellValue::Integer(10));
        assert_eq!(CellType::Number.to_value("10.0", &strings).unwrap(), CellValue::Integer(10));
        assert_eq!(CellType::Number.to_value("2.5", &strings).unwrap(), CellValue::Real(2.5));
        assert_eq!(CellType::SharedString.to_value("0", &strings).unwrap(), CellValue::Text("East".to_owned()));
        assert!(CellType::SharedString.to_value("3", &strings).is_err());
        assert_eq!(CellType::Boolean.to_value("1", &strings).unwrap(), CellValue::Boolean(true));
        assert_eq!(CellType::Error.to_value("#DIV/0!", &strings).unwrap(), CellValue::Null);
        assert_eq!(CellType::NumberTime1900.to_value("0.75", &strings).unwrap(), CellValue::Text("18:00:00".to_owned()));
        assert_eq!(
            CellType::NumberDate1900.to_value("45292", &strings).unwrap(),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }
}
