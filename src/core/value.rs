//! Database value types
//!
//! This module defines the values a record field can hold and the row shape
//! returned by every driver.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// 64-bit integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Text value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// Structured value, normally turned into text by a field codec before
    /// it is written
    Json(serde_json::Value),
}

impl DatabaseValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Integer(v) => Some(*v != 0),
            DatabaseValue::Text(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            DatabaseValue::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DatabaseValue::Integer(v) => Some(*v),
            DatabaseValue::Float(v) => Some(*v as i64),
            DatabaseValue::Text(s) => s.parse().ok(),
            DatabaseValue::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DatabaseValue::Float(v) => Some(*v),
            DatabaseValue::Integer(v) => Some(*v as f64),
            DatabaseValue::Text(s) => s.parse().ok(),
            DatabaseValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    /// Get the value as a string (zero-copy for Text values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a string (with conversion)
    pub fn as_string(&self) -> String {
        match self {
            DatabaseValue::Null => "null".to_string(),
            DatabaseValue::Integer(v) => v.to_string(),
            DatabaseValue::Float(v) => v.to_string(),
            DatabaseValue::Text(s) => s.clone(),
            DatabaseValue::Blob(b) => format!("<{} bytes>", b.len()),
            DatabaseValue::Json(v) => v.to_string(),
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Blob(b) => Some(b),
            DatabaseValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Get the structured value, if this is one
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            DatabaseValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Integer(_) => "integer",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Text(_) => "text",
            DatabaseValue::Blob(_) => "blob",
            DatabaseValue::Json(_) => "json",
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Text(s) => write!(f, "{:?}", s),
            other => f.write_str(&other.as_string()),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Integer(v as i64)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Integer(v as i64)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Integer(v)
    }
}

impl From<u32> for DatabaseValue {
    fn from(v: u32) -> Self {
        DatabaseValue::Integer(v as i64)
    }
}

impl From<f32> for DatabaseValue {
    fn from(v: f32) -> Self {
        DatabaseValue::Float(v as f64)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Float(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::Text(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Blob(v)
    }
}

impl From<serde_json::Value> for DatabaseValue {
    fn from(v: serde_json::Value) -> Self {
        DatabaseValue::Json(v)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A row of database results, in the backend's column order
pub type DatabaseRow = IndexMap<String, DatabaseValue>;

/// Multiple rows returned from a query
pub type DatabaseResult = Vec<DatabaseRow>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        let val = DatabaseValue::Integer(42);
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_float(), Some(42.0));
        assert_eq!(val.as_string(), "42");

        let val = DatabaseValue::Text("123".to_string());
        assert_eq!(val.as_int(), Some(123));

        let val: DatabaseValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
        assert_eq!(val.as_int(), Some(1));
    }

    #[test]
    fn test_value_from_types() {
        let val: DatabaseValue = 42.into();
        assert_eq!(val, DatabaseValue::Integer(42));

        let val: DatabaseValue = "hello".into();
        assert_eq!(val, DatabaseValue::Text("hello".to_string()));

        let val: DatabaseValue = Some(42).into();
        assert_eq!(val, DatabaseValue::Integer(42));

        let val: DatabaseValue = Option::<i32>::None.into();
        assert_eq!(val, DatabaseValue::Null);

        let val: DatabaseValue = serde_json::json!({"first": "bar"}).into();
        assert_eq!(val.type_name(), "json");
        assert!(val.as_json().is_some());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(DatabaseValue::Null.to_string(), "null");
        assert_eq!(DatabaseValue::Text("foo".into()).to_string(), "\"foo\"");
        assert_eq!(DatabaseValue::Blob(vec![1, 2]).to_string(), "<2 bytes>");
    }
}
