//! Inbound delivery shapes.
//!
//! A handler body reaches the pipeline either directly as JSON, or wrapped in
//! the broker's push envelope:
//!
//! ```json
//! {
//!   "message": { "data": "<base64 JSON>", "attributes": {}, "messageId": "1" },
//!   "subscription": "projects/p/subscriptions/pixel-draw"
//! }
//! ```
//!
//! The two shapes have separate entry points so that a direct body is never
//! mistaken for an envelope.

use crate::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;

/// The message carried by a [`PushEnvelope`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64 (standard alphabet, padded) encoding of the payload.
    pub data: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub message_id: String,
    /// RFC3339 publish time. Set on pulled messages, omitted on push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

impl PushMessage {
    /// Wraps raw payload bytes.
    pub fn new(data: &[u8], message_id: &str) -> Self {
        Self {
            data: STANDARD.encode(data),
            attributes: BTreeMap::new(),
            message_id: message_id.to_string(),
            publish_time: None,
        }
    }

    /// Decodes the base64 payload.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(self.data.as_bytes())?)
    }
}

/// Body of a push delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

/// Side-channel message announcing that a user drew a pixel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotice {
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Unwraps a push envelope and decodes its payload as `T`.
///
/// # Errors
///
/// - [`Error::Malformed`] if the body is not an envelope or the payload does
///   not match `T`.
/// - [`Error::InvalidEncoding`] if `message.data` is not valid base64.
pub fn decode_push<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: PushEnvelope = serde_json::from_slice(body)?;
    let data = envelope.message.payload()?;
    tracing::debug!(
        message_id = %envelope.message.message_id,
        subscription = %envelope.subscription,
        bytes = data.len(),
        "Unwrapped push message"
    );
    decode_direct(&data)
}

/// Decodes a raw JSON body as `T`.
pub fn decode_direct<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::Malformed {
        reason: format!("unexpected payload: {e}"),
    })
}

/// Wraps `data` into a push envelope body, as the broker does for push
/// subscriptions.
pub fn encode_push(data: &[u8], message_id: &str, subscription: &str) -> Result<Vec<u8>> {
    let envelope = PushEnvelope {
        message: PushMessage::new(data, message_id),
        subscription: subscription.to_string(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}
