//! Per-field value codecs
//!
//! A codec is a pair of functions applied to one field: `encode` on the way
//! into the database, `decode` on the way out.

use std::fmt;
use std::sync::Arc;

use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;

type Transform = Arc<dyn Fn(&DatabaseValue) -> Result<DatabaseValue> + Send + Sync>;

/// Paired encode/decode transform for one field
#[derive(Clone)]
pub struct Codec {
    encode: Transform,
    decode: Transform,
}

impl Codec {
    /// Build a codec from two functions
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&DatabaseValue) -> Result<DatabaseValue> + Send + Sync + 'static,
        D: Fn(&DatabaseValue) -> Result<DatabaseValue> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Store structured values as JSON text
    ///
    /// Nulls pass through untouched in both directions. Strings and numbers
    /// load back as `Text`, `Integer` and `Float`, so a plain `Text("a")`
    /// survives a round trip; objects, arrays and booleans load as `Json`.
    pub fn json() -> Self {
        Self::new(
            |value| match value {
                DatabaseValue::Null => Ok(DatabaseValue::Null),
                DatabaseValue::Json(v) => Ok(DatabaseValue::Text(serde_json::to_string(v)?)),
                DatabaseValue::Text(s) => Ok(DatabaseValue::Text(serde_json::to_string(s)?)),
                DatabaseValue::Integer(i) => Ok(DatabaseValue::Text(i.to_string())),
                DatabaseValue::Float(f) => Ok(DatabaseValue::Text(serde_json::to_string(f)?)),
                DatabaseValue::Blob(_) => Err(DatabaseError::other(
                    "binary values cannot be stored as JSON",
                )),
            },
            |value| match value {
                DatabaseValue::Null => Ok(DatabaseValue::Null),
                DatabaseValue::Text(s) => Ok(from_json(serde_json::from_str(s)?)),
                DatabaseValue::Blob(b) => Ok(from_json(serde_json::from_slice(b)?)),
                other => Ok(other.clone()),
            },
        )
    }

    /// Apply the encode half, tagging failures with the field name
    pub fn encode(&self, field: &str, value: &DatabaseValue) -> Result<DatabaseValue> {
        (self.encode)(value).map_err(|e| DatabaseError::codec(field, e.to_string()))
    }

    /// Apply the decode half, tagging failures with the field name
    pub fn decode(&self, field: &str, value: &DatabaseValue) -> Result<DatabaseValue> {
        (self.decode)(value).map_err(|e| DatabaseError::codec(field, e.to_string()))
    }
}

/// Map decoded JSON onto the closest value variant
fn from_json(value: serde_json::Value) -> DatabaseValue {
    match value {
        serde_json::Value::Null => DatabaseValue::Null,
        serde_json::Value::String(s) => DatabaseValue::Text(s),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => DatabaseValue::Integer(i),
            None => n
                .as_f64()
                .map_or(DatabaseValue::Json(serde_json::Value::Number(n)), DatabaseValue::Float),
        },
        other => DatabaseValue::Json(other),
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_round_trip() {
        let codec = Codec::json();
        let original = DatabaseValue::Json(json!({"first": "bar", "last": "smith"}));

        let stored = codec.encode("name", &original).unwrap();
        assert_eq!(stored.type_name(), "text");

        let loaded = codec.decode("name", &stored).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_json_codec_passes_null() {
        let codec = Codec::json();
        assert_eq!(
            codec.encode("name", &DatabaseValue::Null).unwrap(),
            DatabaseValue::Null
        );
        assert_eq!(
            codec.decode("name", &DatabaseValue::Null).unwrap(),
            DatabaseValue::Null
        );
    }

    #[test]
    fn test_json_codec_keeps_scalar_variants() {
        let codec = Codec::json();
        for original in [
            DatabaseValue::Text("plain".into()),
            DatabaseValue::Integer(7),
            DatabaseValue::Float(1.5),
        ] {
            let stored = codec.encode("name", &original).unwrap();
            assert_eq!(codec.decode("name", &stored).unwrap(), original);
        }

        let flag = DatabaseValue::Json(json!(true));
        let stored = codec.encode("name", &flag).unwrap();
        assert_eq!(codec.decode("name", &stored).unwrap(), flag);
    }

    #[test]
    fn test_decode_failure_names_field() {
        let codec = Codec::json();
        let err = codec
            .decode("name", &DatabaseValue::Text("{not json".into()))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Codec { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_custom_codec() {
        let upper = Codec::new(
            |v| Ok(DatabaseValue::Text(v.as_string().to_uppercase())),
            |v| Ok(DatabaseValue::Text(v.as_string().to_lowercase())),
        );
        let stored = upper.encode("tag", &"abc".into()).unwrap();
        assert_eq!(stored.as_str(), Some("ABC"));
        assert_eq!(upper.decode("tag", &stored).unwrap().as_str(), Some("abc"));
    }
}
