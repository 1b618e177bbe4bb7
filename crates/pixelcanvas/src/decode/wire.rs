//! Accessors for the store's generic field-value JSON format.
//!
//! Every lookup goes through [`WireTag::spellings`], which lists the accepted
//! spellings of a wrapper key in priority order. The first spelling present
//! wins, even when its value is zero. For integers, a spelling whose value
//! cannot be coerced falls through to the next one.
//!
//! Scalar accessors are three-state: `Ok(None)` when the field is absent,
//! `Ok(Some(_))` when present (zero included), `Err(_)` when present but
//! malformed. Callers pick the default.

use crate::{Error, Result, store::rfc3339};
use chrono::DateTime;
use serde_json::{Map, Value};

/// Wrapper kinds used by chunk documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WireTag {
    Integer,
    Double,
    String,
    Timestamp,
    Map,
}

impl WireTag {
    /// Accepted spellings, camelCase first.
    pub const fn spellings(self) -> [&'static str; 2] {
        match self {
            Self::Integer => ["integerValue", "integer_value"],
            Self::Double => ["doubleValue", "double_value"],
            Self::String => ["stringValue", "string_value"],
            Self::Timestamp => ["timestampValue", "timestamp_value"],
            Self::Map => ["mapValue", "map_value"],
        }
    }

    /// Returns the wrapped value if `wrapper` carries this tag under any
    /// spelling.
    pub fn unwrap(self, wrapper: &Value) -> Option<&Value> {
        let obj = wrapper.as_object()?;
        self.spellings().iter().find_map(|key| obj.get(*key))
    }
}

/// Coerces a JSON scalar to `i64`.
///
/// Accepts a decimal string (the empty string is zero), a JSON float
/// (truncated toward zero) or a JSON integer.
///
/// # Errors
///
/// - [`Error::UnsupportedNumeric`] for booleans, nulls, arrays and objects.
/// - [`Error::InvalidNumber`] for strings that are not decimal integers and
///   for integers above `i64::MAX`.
pub fn coerce_i64(value: &Value) -> Result<i64> {
    match value {
        Value::String(s) if s.is_empty() => Ok(0),
        Value::String(s) => s
            .parse()
            .map_err(|_| Error::InvalidNumber { value: s.clone() }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(Error::InvalidNumber {
                    value: n.to_string(),
                })
            } else {
                // f64 -> i64 casts truncate and saturate.
                Ok(n.as_f64().map_or(0, |f| f as i64))
            }
        }
        Value::Null => Err(Error::UnsupportedNumeric { found: "null" }),
        Value::Bool(_) => Err(Error::UnsupportedNumeric { found: "boolean" }),
        Value::Array(_) => Err(Error::UnsupportedNumeric { found: "array" }),
        Value::Object(_) => Err(Error::UnsupportedNumeric { found: "object" }),
    }
}

/// Reads an integer field: `fields[name].integerValue`.
pub fn integer_field(fields: &Map<String, Value>, name: &str) -> Result<Option<i64>> {
    let Some(wrapper) = fields.get(name) else {
        return Ok(None);
    };
    let mut first_err = None;
    for key in WireTag::Integer.spellings() {
        let Some(inner) = wrapper.get(key) else {
            continue;
        };
        match coerce_i64(inner) {
            Ok(n) => return Ok(Some(n)),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    Err(first_err.unwrap_or_else(|| {
        Error::malformed(format!("field {name:?} is not an integer wrapper"))
    }))
}

/// Returns the `fields` object of a map wrapper.
///
/// `None` if `wrapper` is not a map wrapper or the map has no `fields` (the
/// store omits `fields` for empty maps).
pub fn map_fields(wrapper: &Value) -> Option<&Map<String, Value>> {
    WireTag::Map.unwrap(wrapper)?.get("fields")?.as_object()
}

/// Reads a timestamp field as a canonical RFC3339 string.
///
/// The string form is preferred under any spelling; a `{seconds, nanos}`
/// struct is used only when no string form is present, and is rendered in
/// UTC. A struct with neither `seconds` nor `nanos` counts as absent.
pub fn timestamp_field(fields: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    let Some(wrapper) = fields.get(name) else {
        return Ok(None);
    };
    let Some(obj) = wrapper.as_object() else {
        return Err(Error::malformed(format!(
            "field {name:?} is not a timestamp wrapper"
        )));
    };
    let candidates = || {
        WireTag::Timestamp
            .spellings()
            .into_iter()
            .filter_map(|key| obj.get(key))
    };

    if let Some(s) = candidates().find_map(Value::as_str) {
        return Ok(Some(s.to_string()));
    }

    for ts in candidates().filter_map(Value::as_object) {
        let seconds = ts.get("seconds").map(coerce_i64).transpose()?;
        let nanos = ts.get("nanos").map(coerce_i64).transpose()?;
        if seconds.is_none() && nanos.is_none() {
            continue;
        }
        let nanos = u32::try_from(nanos.unwrap_or(0)).map_err(|_| {
            Error::malformed(format!("field {name:?} has out of range nanos"))
        })?;
        let at = DateTime::from_timestamp(seconds.unwrap_or(0), nanos).ok_or_else(|| {
            Error::malformed(format!("field {name:?} is not a representable time"))
        })?;
        return Ok(Some(rfc3339(&at)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn coerces_supported_shapes() {
        assert_eq!(coerce_i64(&json!("42")).unwrap(), 42);
        assert_eq!(coerce_i64(&json!("-7")).unwrap(), -7);
        assert_eq!(coerce_i64(&json!("")).unwrap(), 0);
        assert_eq!(coerce_i64(&json!(42)).unwrap(), 42);
        assert_eq!(coerce_i64(&json!(42.9)).unwrap(), 42);
        assert_eq!(coerce_i64(&json!(-3.5)).unwrap(), -3);
    }

    #[test]
    fn rejects_unsupported_shapes() {
        assert_eq!(
            coerce_i64(&json!(true)).unwrap_err(),
            Error::UnsupportedNumeric { found: "boolean" }
        );
        assert_eq!(
            coerce_i64(&json!({"n": 1})).unwrap_err(),
            Error::UnsupportedNumeric { found: "object" }
        );
        assert_eq!(
            coerce_i64(&Value::Null).unwrap_err(),
            Error::UnsupportedNumeric { found: "null" }
        );
        assert!(matches!(
            coerce_i64(&json!("7.5")).unwrap_err(),
            Error::InvalidNumber { .. }
        ));
        assert!(matches!(
            coerce_i64(&json!(u64::MAX)).unwrap_err(),
            Error::InvalidNumber { .. }
        ));
    }

    #[test]
    fn integer_field_is_three_state() {
        let f = fields(json!({
            "zero": { "integerValue": "0" },
            "snake": { "integer_value": 9 },
            "text": { "stringValue": "x" },
            "bad": { "integerValue": true },
        }));
        assert_eq!(integer_field(&f, "missing").unwrap(), None);
        assert_eq!(integer_field(&f, "zero").unwrap(), Some(0));
        assert_eq!(integer_field(&f, "snake").unwrap(), Some(9));
        assert!(integer_field(&f, "text").is_err());
        assert!(integer_field(&f, "bad").is_err());
    }

    #[test]
    fn malformed_spelling_falls_through_to_the_next() {
        let f = fields(json!({
            "both": { "integerValue": "abc", "integer_value": "7" },
            "neither": { "integerValue": true, "integer_value": null },
        }));
        assert_eq!(integer_field(&f, "both").unwrap(), Some(7));
        assert_eq!(
            integer_field(&f, "neither").unwrap_err(),
            Error::UnsupportedNumeric { found: "boolean" }
        );
    }

    #[test]
    fn camel_case_wins_even_when_zero() {
        let f = fields(json!({ "n": { "integerValue": "0", "integer_value": "5" } }));
        assert_eq!(integer_field(&f, "n").unwrap(), Some(0));
    }

    #[test]
    fn map_fields_accepts_both_spellings() {
        let camel = json!({ "mapValue": { "fields": { "a": {} } } });
        let snake = json!({ "map_value": { "fields": { "b": {} } } });
        assert!(map_fields(&camel).unwrap().contains_key("a"));
        assert!(map_fields(&snake).unwrap().contains_key("b"));
        assert!(map_fields(&json!({ "mapValue": {} })).is_none());
        assert!(map_fields(&json!({ "integerValue": "1" })).is_none());
    }

    #[test]
    fn timestamp_prefers_string_form() {
        let f = fields(json!({
            "t": {
                "timestamp_value": { "seconds": 1, "nanos": 0 },
                "timestampValue": "2025-01-01T00:00:00Z",
            }
        }));
        assert_eq!(
            timestamp_field(&f, "t").unwrap().as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn timestamp_struct_renders_utc() {
        let f = fields(json!({
            "t": { "timestamp_value": { "seconds": "1700000000", "nanos": 500000000 } }
        }));
        assert_eq!(
            timestamp_field(&f, "t").unwrap().as_deref(),
            Some("2023-11-14T22:13:20.5Z")
        );
        let empty = fields(json!({ "t": { "timestamp_value": {} } }));
        assert_eq!(timestamp_field(&empty, "t").unwrap(), None);
        let bad = fields(json!({ "t": { "timestampValue": { "nanos": -1 } } }));
        assert!(timestamp_field(&bad, "t").is_err());
    }

    proptest! {
        #[test]
        fn user_ids_round_trip_through_every_encoding(n in -(1i64 << 53)..=(1i64 << 53)) {
            prop_assert_eq!(coerce_i64(&json!(n.to_string())).unwrap(), n);
            prop_assert_eq!(coerce_i64(&json!(n)).unwrap(), n);
            prop_assert_eq!(coerce_i64(&json!(n as f64)).unwrap(), n);
        }

        #[test]
        fn full_range_integers_round_trip(n in any::<i64>()) {
            prop_assert_eq!(coerce_i64(&json!(n.to_string())).unwrap(), n);
            prop_assert_eq!(coerce_i64(&json!(n)).unwrap(), n);
        }
    }
}
