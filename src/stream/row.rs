//! Decoded rows and column conversion

use crate::{Error, Result};
use serde_json::Value as JsonValue;

/// One result row (columns in SELECT order)
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<JsonValue>,
}

impl Row {
    /// Wrap decoded columns
    pub fn new(columns: Vec<JsonValue>) -> Self {
        Self { columns }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Raw column values
    pub fn columns(&self) -> &[JsonValue] {
        &self.columns
    }

    /// Decode column `index`
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.columns.get(index).ok_or_else(|| Error::RowDecode {
            column: index,
            message: format!("column out of range (row has {})", self.columns.len()),
        })?;
        T::from_value(value).map_err(|message| Error::RowDecode {
            column: index,
            message,
        })
    }

    /// Fail unless the row has exactly `expected` columns
    pub fn expect_columns(&self, expected: usize) -> Result<()> {
        if self.columns.len() != expected {
            return Err(Error::RowDecode {
                column: expected.min(self.columns.len()),
                message: format!(
                    "expected {} columns, got {}",
                    expected,
                    self.columns.len()
                ),
            });
        }
        Ok(())
    }
}

/// Conversion from a single column value
///
/// Errors are plain messages; [`Row::get`] attaches the column index.
pub trait FromValue: Sized {
    /// Convert one column
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String>;
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "NULL",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl FromValue for String {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot decode {} into String", kind(other))),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("number {} out of range for UInt64", n)),
            // 64-bit integers are quoted by default in JSON output formats
            JsonValue::String(s) => s
                .parse()
                .map_err(|_| format!("cannot parse {:?} as UInt64", s)),
            other => Err(format!("cannot decode {} into UInt64", kind(other))),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .ok_or_else(|| format!("number {} out of range for Int64", n)),
            JsonValue::String(s) => s
                .parse()
                .map_err(|_| format!("cannot parse {:?} as Int64", s)),
            other => Err(format!("cannot decode {} into Int64", kind(other))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::Number(n) => n
                .as_f64()
                .ok_or_else(|| format!("number {} not representable as Float64", n)),
            JsonValue::String(s) => s
                .parse()
                .map_err(|_| format!("cannot parse {:?} as Float64", s)),
            other => Err(format!("cannot decode {} into Float64", kind(other))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::Number(n) if n.as_u64() == Some(0) => Ok(false),
            JsonValue::Number(n) if n.as_u64() == Some(1) => Ok(true),
            other => Err(format!("cannot decode {} into Bool", kind(other))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &JsonValue) -> std::result::Result<Self, String> {
        match value {
            JsonValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Conversion from a whole row
pub trait FromRow: Sized {
    /// Convert one row
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_string() {
        let row = Row::new(vec![json!("0xabc"), json!(7), json!(true)]);
        assert_eq!(row.get::<String>(0).unwrap(), "0xabc");
        assert_eq!(row.get::<String>(1).unwrap(), "7");
        assert_eq!(row.get::<String>(2).unwrap(), "true");
    }

    #[test]
    fn test_get_string_rejects_null() {
        let row = Row::new(vec![json!(null)]);
        match row.get::<String>(0) {
            Err(Error::RowDecode { column, message }) => {
                assert_eq!(column, 0);
                assert!(message.contains("NULL"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_get_u64_quoted_and_plain() {
        let row = Row::new(vec![json!("18446744073709551615"), json!(42), json!(-1)]);
        assert_eq!(row.get::<u64>(0).unwrap(), u64::MAX);
        assert_eq!(row.get::<u64>(1).unwrap(), 42);
        assert!(row.get::<u64>(2).is_err());
    }

    #[test]
    fn test_get_out_of_range() {
        let row = Row::new(vec![json!("a")]);
        assert!(matches!(
            row.get::<String>(3),
            Err(Error::RowDecode { column: 3, .. })
        ));
    }

    #[test]
    fn test_option_and_bool() {
        let row = Row::new(vec![json!(null), json!(1), json!(false)]);
        assert_eq!(row.get::<Option<u64>>(0).unwrap(), None);
        assert_eq!(row.get::<Option<u64>>(1).unwrap(), Some(1));
        assert!(row.get::<bool>(1).unwrap());
        assert!(!row.get::<bool>(2).unwrap());
    }

    #[test]
    fn test_signed_and_float() {
        let row = Row::new(vec![json!("-12"), json!(1.5)]);
        assert_eq!(row.get::<i64>(0).unwrap(), -12);
        assert_eq!(row.get::<f64>(1).unwrap(), 1.5);
    }

    #[test]
    fn test_expect_columns() {
        let row = Row::new(vec![json!("a"), json!("b")]);
        assert!(row.expect_columns(2).is_ok());
        assert!(matches!(
            row.expect_columns(1),
            Err(Error::RowDecode { column: 1, .. })
        ));
        assert!(!row.is_empty());
        assert_eq!(row.len(), 2);
    }
}
