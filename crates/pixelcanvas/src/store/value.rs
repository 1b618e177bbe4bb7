use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Field map of a document or of a nested map value.
pub type Fields = BTreeMap<String, FieldValue>;

/// A typed document field.
///
/// [`FieldValue::ServerTimestamp`] is a write-side sentinel: the store
/// replaces it with its own commit time, so it never appears in a document
/// that was read back.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    ServerTimestamp,
    Map(Fields),
}

impl FieldValue {
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short name of the variant, for log lines.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::ServerTimestamp => "server timestamp",
            Self::Map(_) => "map",
        }
    }

    /// Renders this value in the store's generic field-value JSON format.
    ///
    /// Integers are rendered as decimal strings and timestamps as RFC3339
    /// strings, matching the camelCase JSON mapping the hosted store uses.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Null | Self::ServerTimestamp => json!({ "nullValue": null }),
            Self::Boolean(b) => json!({ "booleanValue": b }),
            Self::Integer(n) => json!({ "integerValue": n.to_string() }),
            Self::Double(d) => json!({ "doubleValue": d }),
            Self::String(s) => json!({ "stringValue": s }),
            Self::Timestamp(ts) => json!({ "timestampValue": rfc3339(ts) }),
            Self::Map(fields) => json!({ "mapValue": { "fields": fields_to_wire(fields) } }),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Fields> for FieldValue {
    fn from(value: Fields) -> Self {
        Self::Map(value)
    }
}

/// Renders a field map as a JSON object of wire values.
pub fn fields_to_wire(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect::<Map<_, _>>(),
    )
}

/// Canonical RFC3339 rendering used on the wire: UTC, `Z` suffix, and only
/// as many fractional digits as needed, so half a second is `.5Z`.
pub fn rfc3339(ts: &DateTime<Utc>) -> String {
    let full = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let Some((seconds, fraction)) = full.trim_end_matches('Z').split_once('.') else {
        return full;
    };
    match fraction.trim_end_matches('0') {
        "" => format!("{seconds}Z"),
        digits => format!("{seconds}.{digits}Z"),
    }
}

/// A document as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Full resource name, e.g.
    /// `projects/p/databases/(default)/documents/users/42`.
    pub name: String,
    pub fields: Fields,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Renders the document in the store's generic JSON document format.
    pub fn to_wire(&self) -> Value {
        json!({
            "name": self.name,
            "fields": fields_to_wire(&self.fields),
            "createTime": rfc3339(&self.create_time),
            "updateTime": rfc3339(&self.update_time),
        })
    }
}
