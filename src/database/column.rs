use crate::value::CellValue;
use serde::Serialize;

/// Logical column types a normalized table can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit signed integers
    Integer,
    /// Double-precision floating point numbers
    Real,
    /// Variable-length strings
    Text,
    /// Boolean values (true/false)
    Boolean,
    /// Calendar date without time component
    Date,
    /// Date and time with microsecond precision
    DateTime,
}

impl ColumnType {
    /// Returns the logical name used in schema descriptions.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        }
    }

    /// Returns the DuckDB storage type for this column.
    pub const fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "TIMESTAMP",
        }
    }

    /// Infers the narrowest type every non-null value fits.
    ///
    /// Candidates are tried in a fixed order: integer, real, date or
    /// date-time, boolean and finally text. A column without any non-null
    /// value is text.
    pub fn detect<'a, I>(values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a CellValue>,
    {
        let values: Vec<&CellValue> = values.into_iter().filter(|value| !value.is_null()).collect();
        if values.is_empty() {
            ColumnType::Text
        } else if values.iter().all(|value| value.as_integer().is_some()) {
            ColumnType::Integer
        } else if values.iter().all(|value| value.as_real().is_some()) {
            ColumnType::Real
        } else if values.iter().all(|value| value.as_datetime().is_some()) {
            if values.iter().all(|value| Self::is_date_only(value)) {
                ColumnType::Date
            } else {
                ColumnType::DateTime
            }
        } else if values.iter().all(|value| value.as_boolean().is_some()) {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// Converts a raw value into this column's representation.
    ///
    /// Returns `Null` for values that do not fit, which cannot happen for
    /// values the type was detected from.
    pub fn coerce(&self, value: &CellValue) -> CellValue {
        if value.is_null() {
            return CellValue::Null;
        }
        let coerced = match self {
            ColumnType::Integer => value.as_integer().map(CellValue::Integer),
            ColumnType::Real => value.as_real().map(CellValue::Real),
            ColumnType::Text => Some(CellValue::Text(value.to_string())),
            ColumnType::Boolean => value.as_boolean().map(CellValue::Boolean),
            ColumnType::Date => value.as_datetime().map(|datetime| CellValue::Date(datetime.date())),
            ColumnType::DateTime => value.as_datetime().map(CellValue::DateTime),
        };
        coerced.unwrap_or_default()
    }

    /// Returns true if the value carries no time-of-day component.
    #[inline]
    fn is_date_only(value: &CellValue) -> bool {
        match value {
            CellValue::Date(_) => true,
            CellValue::DateTime(datetime) => datetime.time() == chrono::NaiveTime::MIN,
            CellValue::Text(text) => {
                let text = text.trim();
                !text.contains(['T', ' ', ':'])
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn texts(values: &[&str]) -> Vec<CellValue> {
        values
            .iter()
            .map(|value| match *value {
                "" => CellValue::Null,
                value => CellValue::Text(value.to_owned()),
            })
            .collect()
    }

    #[test]
    fn integers_with_nulls() {
        assert_eq!(ColumnType::detect(&texts(&["1", "", "42"])), ColumnType::Integer);
    }

    #[test]
    fn one_non_numeric_value_widens_to_text() {
        assert_eq!(ColumnType::detect(&texts(&["1", "2", "n/a"])), ColumnType::Text);
    }

    #[test]
    fn mixed_numbers_are_real() {
        let values = vec![CellValue::Integer(3), CellValue::Real(2.5)];
        assert_eq!(ColumnType::detect(&values), ColumnType::Real);
    }

    #[test]
    fn dates_and_datetimes() {
        assert_eq!(ColumnType::detect(&texts(&["2024-01-01", "2024-02-01"])), ColumnType::Date);
        assert_eq!(
            ColumnType::detect(&texts(&["2024-01-01", "2024-02-01 10:30:00"])),
            ColumnType::DateTime
        );
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let values = vec![CellValue::Date(date), CellValue::Text("2024-05-07".to_owned())];
        assert_eq!(ColumnType::detect(&values), ColumnType::Date);
    }

    #[test]
    fn booleans_after_numbers() {
        assert_eq!(ColumnType::detect(&texts(&["true", "FALSE"])), ColumnType::Boolean);
        assert_eq!(ColumnType::detect(&texts(&["0", "1"])), ColumnType::Integer);
        let values = vec![CellValue::Boolean(true), CellValue::Boolean(false)];
        assert_eq!(ColumnType::detect(&values), ColumnType::Boolean);
    }

    #[test]
    fn empty_column_is_text() {
        assert_eq!(ColumnType::detect(&texts(&["", ""])), ColumnType::Text);
    }

    #[test]
    fn coerce_values() {
        assert_eq!(ColumnType::Integer.coerce(&CellValue::Text("7".to_owned())), CellValue::Integer(7));
        assert_eq!(ColumnType::Real.coerce(&CellValue::Integer(7)), CellValue::Real(7.0));
        assert_eq!(ColumnType::Text.coerce(&CellValue::Integer(7)), CellValue::Text("7".to_owned()));
        assert_eq!(ColumnType::Text.coerce(&CellValue::Null), CellValue::Null);
        assert_eq!(
            ColumnType::Date.coerce(&CellValue::Text("2024-01-31".to_owned())),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
    }
}
