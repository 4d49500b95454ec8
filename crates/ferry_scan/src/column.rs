//! Column declarations and cell conversion.

use crate::error::{ScanError, ScanResult};
use chrono::{NaiveDate, NaiveDateTime};
use ferry_plan::{escape_binary, Value};
use std::fmt;
use std::str::FromStr;

/// Name that selects the row key instead of a cell.
pub const ROWKEY_COLUMN: &str = "rowkey";

/// Date format used when a DATE column declares none.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// One byte, non-zero is true.
    Boolean,
    /// Two-byte integer, surfaced as decimal text.
    Short,
    /// Four-byte integer.
    Int,
    /// Eight-byte integer.
    Long,
    /// Four-byte IEEE float.
    Float,
    /// Eight-byte IEEE float.
    Double,
    /// UTF-8 text.
    String,
    /// Arbitrary bytes rendered as binary key text.
    BinaryString,
    /// Text parsed with the column's date format.
    Date,
}

impl ColumnType {
    /// Upper-case type name.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Short => "SHORT",
            ColumnType::Int => "INT",
            ColumnType::Long => "LONG",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::String => "STRING",
            ColumnType::BinaryString => "BINARY_STRING",
            ColumnType::Date => "DATE",
        }
    }

    fn width(self) -> Option<usize> {
        match self {
            ColumnType::Boolean => Some(1),
            ColumnType::Short => Some(2),
            ColumnType::Int | ColumnType::Float => Some(4),
            ColumnType::Long | ColumnType::Double => Some(8),
            _ => None,
        }
    }
}

impl FromStr for ColumnType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOLEAN" => Ok(ColumnType::Boolean),
            "SHORT" => Ok(ColumnType::Short),
            "INT" => Ok(ColumnType::Int),
            "LONG" => Ok(ColumnType::Long),
            "FLOAT" => Ok(ColumnType::Float),
            "DOUBLE" => Ok(ColumnType::Double),
            "STRING" => Ok(ColumnType::String),
            "BINARY_STRING" => Ok(ColumnType::BinaryString),
            "DATE" => Ok(ColumnType::Date),
            _ => Err(ScanError::UnsupportedColumnType(s.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One output column of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// `rowkey` or `family:qualifier`.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
    /// chrono format for DATE columns.
    pub format: Option<String>,
    /// Literal emitted instead of reading the store.
    pub constant: Option<String>,
}

impl ColumnSpec {
    /// Declares a column read from the store.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            format: None,
            constant: None,
        }
    }

    /// Sets the date format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Emits `value` for every row instead of reading the store.
    pub fn with_constant(mut self, value: impl Into<String>) -> Self {
        self.constant = Some(value.into());
        self
    }

    /// Returns true if this column selects the row key.
    pub fn is_rowkey(&self) -> bool {
        self.name == ROWKEY_COLUMN
    }

    /// Returns true if a non-empty constant is configured.
    pub fn is_constant(&self) -> bool {
        self.constant.as_deref().is_some_and(|c| !c.is_empty())
    }

    fn date_format(&self) -> &str {
        self.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT)
    }

    /// Converts raw cell bytes. Missing or empty bytes decode to `Null`.
    pub fn decode(&self, raw: Option<&[u8]>) -> ScanResult<Value> {
        let bytes = match raw {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Ok(Value::Null),
        };

        if let Some(width) = self.column_type.width() {
            if bytes.len() != width {
                return Err(ScanError::decode(
                    &self.name,
                    format!(
                        "{} needs {width} bytes, got {}",
                        self.column_type,
                        bytes.len()
                    ),
                ));
            }
        }

        let value = match self.column_type {
            ColumnType::Boolean => Value::Bool(bytes[0] != 0),
            ColumnType::Short => {
                Value::Text(i16::from_be_bytes([bytes[0], bytes[1]]).to_string())
            }
            ColumnType::Int => Value::Int(i64::from(i32::from_be_bytes(array(bytes)))),
            ColumnType::Long => Value::Int(i64::from_be_bytes(array(bytes))),
            ColumnType::Float => Value::Float(f64::from(f32::from_be_bytes(array(bytes)))),
            ColumnType::Double => Value::Float(f64::from_be_bytes(array(bytes))),
            ColumnType::String => match std::str::from_utf8(bytes) {
                Ok(text) => Value::Text(text.to_string()),
                Err(e) => return Err(ScanError::decode(&self.name, e.to_string())),
            },
            ColumnType::BinaryString => Value::Text(escape_binary(bytes)),
            ColumnType::Date => Value::Date(self.parse_date(&escape_binary(bytes))?),
        };
        Ok(value)
    }

    /// Converts the configured constant, or `None` without one.
    pub fn constant_value(&self) -> ScanResult<Option<Value>> {
        let text = match self.constant.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => return Ok(None),
        };

        let value = match self.column_type {
            ColumnType::Boolean => Value::Bool(text.trim().eq_ignore_ascii_case("true")),
            ColumnType::Short | ColumnType::Int | ColumnType::Long => {
                Value::Int(self.parse_integer(text)?)
            }
            ColumnType::Float | ColumnType::Double => {
                let parsed = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| ScanError::decode(&self.name, format!("{text}: {e}")))?;
                Value::Float(parsed)
            }
            ColumnType::String => Value::Text(text.to_string()),
            ColumnType::Date => Value::Date(self.parse_date(text)?),
            ColumnType::BinaryString => {
                return Err(ScanError::UnsupportedColumnType(format!(
                    "{} constant for column {}",
                    self.column_type, self.name
                )))
            }
        };
        Ok(Some(value))
    }

    /// Decimal parse that truncates any fractional part.
    fn parse_integer(&self, text: &str) -> ScanResult<i64> {
        let trimmed = text.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let whole = match whole {
            "" | "-" | "+" if !fraction.is_empty() => "0",
            other => other,
        };
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScanError::decode(&self.name, format!("{text} is not a number")));
        }
        whole
            .parse::<i64>()
            .map_err(|e| ScanError::decode(&self.name, format!("{text}: {e}")))
    }

    fn parse_date(&self, text: &str) -> ScanResult<NaiveDateTime> {
        let format = self.date_format();
        NaiveDateTime::parse_from_str(text, format)
            .or_else(|_| {
                NaiveDate::parse_from_str(text, format)
                    .map(|date| date.and_time(chrono::NaiveTime::MIN))
            })
            .map_err(|e| ScanError::decode(&self.name, format!("{text} with {format}: {e}")))
    }
}

/// Copies an exact-width slice into an array; callers check the width.
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
