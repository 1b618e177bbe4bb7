use super::wire::{integer_field, map_fields, timestamp_field};
use crate::{ChunkId, Error, PixelKey, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One pixel of a [`ChunkUpdateEvent`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelUpdate {
    pub color: i64,
    pub user: i64,
}

/// The flat chunk-change message published to downstream consumers.
///
/// Serializes as `{"size", "pixels", "chunkX", "chunkY", "lastUpdated"?}`.
/// Pixels are keyed by `"<localX>_<localY>"` and kept sorted, so encoding the
/// same event twice yields identical bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpdateEvent {
    pub size: i32,
    pub pixels: BTreeMap<String, PixelUpdate>,
    pub chunk_x: i64,
    pub chunk_y: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl ChunkUpdateEvent {
    /// Compact JSON encoding.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Decodes a change-capture notification (`{"value": <document>,
/// "oldValue": <document>?}`).
///
/// Returns `Ok(None)` when the notification carries no new value, e.g. for a
/// deletion; there is nothing to publish in that case.
pub fn decode_change(payload: &Value) -> Result<Option<ChunkUpdateEvent>> {
    let Some(obj) = payload.as_object() else {
        return Err(Error::malformed("change payload is not a JSON object"));
    };
    match obj.get("value") {
        None | Some(Value::Null) => Ok(None),
        Some(document) => decode_chunk_document(document).map(Some),
    }
}

/// Decodes a chunk document in wire format into a [`ChunkUpdateEvent`].
///
/// - Chunk coordinates come from the last segment of `name`; a name that is
///   not a chunk id leaves them at zero.
/// - `size`, and each pixel's `color` and `user`, default to zero when absent
///   or malformed.
/// - Pixel entries that are not map wrappers are skipped.
/// - `lastUpdated` is omitted when the document has none.
///
/// # Errors
///
/// - [`Error::Malformed`] if the document has no `fields` object.
/// - [`Error::InvalidPixelKey`] if a pixel key is not `<localX>_<localY>`
///   inside the chunk.
///
/// # Example
///
/// ```
/// use pixelcanvas::decode_chunk_document;
/// use serde_json::json;
///
/// let doc = json!({
///     "name": "projects/p/databases/d/documents/canvas_chunks/canvas_chunks_2_-1",
///     "fields": {
///         "pixels": { "map_value": { "fields": {
///             "5_5": { "map_value": { "fields": {
///                 "color": { "integer_value": "7" }
///             }}}
///         }}}
///     }
/// });
/// let event = decode_chunk_document(&doc).unwrap();
/// assert_eq!((event.chunk_x, event.chunk_y), (2, -1));
/// assert_eq!(event.pixels["5_5"].color, 7);
/// ```
pub fn decode_chunk_document(document: &Value) -> Result<ChunkUpdateEvent> {
    let (chunk_x, chunk_y) = match document.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => match ChunkId::from_document_name(name) {
            Ok(id) => (id.x, id.y),
            Err(_e) => {
                tracing::debug!(name, "Document name is not a chunk id: {_e}");
                (0, 0)
            }
        },
        _ => (0, 0),
    };

    let Some(fields) = document.get("fields").and_then(Value::as_object) else {
        return Err(Error::malformed("missing fields in document JSON"));
    };

    let size = integer_field(fields, "size")
        .and_then(|size| {
            size.map(|n| {
                i32::try_from(n).map_err(|_| Error::InvalidNumber {
                    value: n.to_string(),
                })
            })
            .transpose()
        })
        .unwrap_or_else(|_e| {
            tracing::warn!("Malformed chunk size, defaulting to 0: {_e}");
            None
        })
        .unwrap_or(0);

    let mut pixels = BTreeMap::new();
    if let Some(entries) = fields.get("pixels").and_then(map_fields) {
        for (key, entry) in entries {
            let Some(pixel) = map_fields(entry) else {
                continue;
            };
            PixelKey::parse_within(key, i64::from(size))?;
            pixels.insert(
                key.clone(),
                PixelUpdate {
                    color: integer_or_zero(pixel, key, "color"),
                    user: integer_or_zero(pixel, key, "user"),
                },
            );
        }
    }

    let last_updated = timestamp_field(fields, "lastUpdated").unwrap_or_else(|_e| {
        tracing::warn!("Malformed lastUpdated, omitting it: {_e}");
        None
    });

    Ok(ChunkUpdateEvent {
        size,
        pixels,
        chunk_x,
        chunk_y,
        last_updated,
    })
}

fn integer_or_zero(fields: &serde_json::Map<String, Value>, key: &str, name: &str) -> i64 {
    match integer_field(fields, name) {
        Ok(value) => value.unwrap_or(0),
        Err(_e) => {
            tracing::warn!(
                pixel = key,
                field = name,
                "Malformed pixel field, defaulting to 0: {_e}"
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldValue, Fields};
    use chrono::DateTime;
    use serde_json::json;

    fn camel_chunk() -> Value {
        json!({
            "name": "projects/local/databases/(default)/documents/canvas_chunks/canvas_chunks_1_0",
            "fields": {
                "size": { "integerValue": "100" },
                "pixels": { "mapValue": { "fields": {
                    "50_12": { "mapValue": { "fields": {
                        "color": { "integerValue": "3" },
                        "user": { "integerValue": "42" },
                    }}},
                    "0_0": { "mapValue": { "fields": {
                        "color": { "integerValue": "0" },
                        "user": { "integerValue": "9" },
                    }}},
                }}},
                "lastUpdated": { "timestampValue": "2025-03-01T12:00:00.25Z" },
            }
        })
    }

    #[test]
    fn decodes_camel_case_document() {
        let event = decode_chunk_document(&camel_chunk()).unwrap();
        assert_eq!(event.size, 100);
        assert_eq!((event.chunk_x, event.chunk_y), (1, 0));
        assert_eq!(event.pixels["50_12"], PixelUpdate { color: 3, user: 42 });
        assert_eq!(event.pixels["0_0"], PixelUpdate { color: 0, user: 9 });
        assert_eq!(
            event.last_updated.as_deref(),
            Some("2025-03-01T12:00:00.25Z")
        );
    }

    #[test]
    fn decodes_snake_case_with_negative_chunk() {
        let doc = json!({
            "name": "projects/p/databases/d/documents/canvas_chunks/canvas_chunks_2_-1",
            "fields": {
                "size": { "integer_value": 10 },
                "pixels": { "map_value": { "fields": {
                    "5_5": { "map_value": { "fields": {
                        "color": { "integer_value": "7" },
                        "user": { "integer_value": 12345.0 },
                    }}}
                }}},
                "lastUpdated": { "timestamp_value": { "seconds": 1700000000, "nanos": 0 } },
            }
        });
        let event = decode_chunk_document(&doc).unwrap();
        assert_eq!((event.chunk_x, event.chunk_y), (2, -1));
        assert_eq!(event.pixels["5_5"], PixelUpdate { color: 7, user: 12345 });
        assert_eq!(event.last_updated.as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn unparsable_name_defaults_coordinates() {
        let mut doc = camel_chunk();
        doc["name"] = json!("projects/p/databases/d/documents/canvas_chunks/not_a_chunk");
        let event = decode_chunk_document(&doc).unwrap();
        assert_eq!((event.chunk_x, event.chunk_y), (0, 0));
        assert_eq!(event.pixels.len(), 2);
    }

    #[test]
    fn missing_values_default_to_zero_and_omit_timestamp() {
        let doc = json!({
            "name": "canvas_chunks_3_4",
            "fields": {
                "size": { "integerValue": true },
                "pixels": { "mapValue": { "fields": {
                    "1_1": { "mapValue": { "fields": {} } },
                    "2_2": { "integerValue": "1" },
                }}},
            }
        });
        let event = decode_chunk_document(&doc).unwrap();
        assert_eq!(event.size, 0);
        assert_eq!(event.pixels["1_1"], PixelUpdate::default());
        assert!(!event.pixels.contains_key("2_2"));
        assert!(event.last_updated.is_none());
        let encoded = String::from_utf8(event.to_bytes().unwrap().to_vec()).unwrap();
        assert!(!encoded.contains("lastUpdated"));
    }

    #[test]
    fn pixel_key_outside_chunk_is_a_data_error() {
        let mut doc = camel_chunk();
        doc["fields"]["size"] = json!({ "integerValue": "10" });
        let err = decode_chunk_document(&doc).unwrap_err();
        assert!(matches!(err, Error::InvalidPixelKey { .. }));
    }

    #[test]
    fn missing_fields_is_malformed() {
        let err = decode_chunk_document(&json!({ "name": "canvas_chunks_0_0" })).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn change_without_value_publishes_nothing() {
        assert_eq!(decode_change(&json!({ "oldValue": camel_chunk() })).unwrap(), None);
        assert!(decode_change(&json!({ "value": camel_chunk() })).unwrap().is_some());
        assert!(decode_change(&json!("nope")).is_err());
    }

    #[test]
    fn decoding_is_deterministic() {
        let payload = json!({ "value": camel_chunk() });
        let first = decode_change(&payload).unwrap().unwrap().to_bytes().unwrap();
        let second = decode_change(&payload).unwrap().unwrap().to_bytes().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            std::str::from_utf8(&first).unwrap(),
            r#"{"size":100,"pixels":{"0_0":{"color":0,"user":9},"50_12":{"color":3,"user":42}},"chunkX":1,"chunkY":0,"lastUpdated":"2025-03-01T12:00:00.25Z"}"#
        );
    }

    #[test]
    fn decodes_what_the_store_renders() {
        let user = 9_007_199_254_740_993_i64;
        let pixel = Fields::from([
            ("color".to_string(), FieldValue::from(5u8)),
            ("user".to_string(), FieldValue::from(user)),
        ]);
        let fields = Fields::from([
            ("size".to_string(), FieldValue::from(64i32)),
            (
                "pixels".to_string(),
                FieldValue::Map(Fields::from([("63_0".to_string(), FieldValue::Map(pixel))])),
            ),
            (
                "lastUpdated".to_string(),
                FieldValue::from(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
            ),
        ]);
        let doc = json!({
            "name": "projects/p/databases/d/documents/canvas_chunks/canvas_chunks_-1_7",
            "fields": crate::store::fields_to_wire(&fields),
        });
        let event = decode_chunk_document(&doc).unwrap();
        assert_eq!((event.chunk_x, event.chunk_y), (-1, 7));
        assert_eq!(event.pixels["63_0"], PixelUpdate { color: 5, user });
        assert_eq!(event.last_updated.as_deref(), Some("2023-11-14T22:13:20Z"));
    }
}
