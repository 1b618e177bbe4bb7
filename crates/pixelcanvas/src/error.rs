//! Error types for the canvas pipeline.
//!
//! This module defines the central [`Error`] enum, which captures every
//! recoverable and reportable failure of the pipeline stages. Each variant
//! belongs to exactly one [`ErrorClass`], which is what transports use to pick
//! a response code and a log severity.
//!
//! ## Error Cases
//! - `Config`, `InvalidChunkSize`: settings are missing or unusable.
//! - `Malformed`, `InvalidEncoding`, `InvalidUserId`, `InvalidPixelKey`,
//!   `InvalidChunkId`, `UnsupportedNumeric`, `InvalidNumber`: the input was
//!   rejected and no state was mutated.
//! - `RateLimited`: the user is still inside the cooldown window.
//! - `Store`, `Broker`, `Seek`: an external collaborator failed. Nothing is
//!   retried here; redelivery belongs to the trigger.

use core::time::Duration;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the canvas pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A required setting is missing or invalid.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Chunk size must be strictly positive.
    #[error("Invalid chunk size: {size}")]
    InvalidChunkSize { size: i64 },

    /// The request or payload did not match the expected schema.
    #[error("Malformed input: {reason}")]
    Malformed { reason: String },

    /// The transport envelope could not be decoded (e.g. bad base64).
    #[error("Invalid encoding: {reason}")]
    InvalidEncoding { reason: String },

    /// The wire user id is not representable as an `i64`.
    #[error("Invalid user id: {user:?}")]
    InvalidUserId { user: String },

    /// A pixel key does not match `<localX>_<localY>` within the chunk.
    #[error("Invalid pixel key {key:?}: {reason}")]
    InvalidPixelKey { key: String, reason: String },

    /// A chunk document name does not match `canvas_chunks_{x}_{y}`.
    #[error("Invalid chunk id: {id:?}")]
    InvalidChunkId { id: String },

    /// A numeric wrapper held a JSON value of the wrong shape.
    #[error("Unsupported numeric representation: {found}")]
    UnsupportedNumeric { found: &'static str },

    /// A decimal string could not be parsed as an integer.
    #[error("Invalid number: {value:?}")]
    InvalidNumber { value: String },

    /// The user drew again before the cooldown elapsed.
    #[error("Rate limit exceeded: retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The document store failed or rejected a write.
    #[error("Store error: {context}")]
    Store { context: String },

    /// The message broker failed to publish or list.
    #[error("Broker error: {context}")]
    Broker { context: String },

    /// Seeking a subscription failed; the reset stopped here.
    #[error("Failed to seek subscription {subscription}: {reason}")]
    Seek {
        subscription: String,
        reason: String,
    },
}

/// Coarse classification of an [`Error`], used by transports to pick a status
/// and by handlers to pick a log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Fatal for the invocation, reported as a server error.
    Config,
    /// Client error, the request is rejected.
    Malformed,
    /// Forbidden outcome, not logged as an error.
    RateLimited,
    /// Server error, the trigger is expected to redeliver.
    Dependency,
}

impl Error {
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Config { .. } | Self::InvalidChunkSize { .. } => ErrorClass::Config,
            Self::Malformed { .. }
            | Self::InvalidEncoding { .. }
            | Self::InvalidUserId { .. }
            | Self::InvalidPixelKey { .. }
            | Self::InvalidChunkId { .. }
            | Self::UnsupportedNumeric { .. }
            | Self::InvalidNumber { .. } => ErrorClass::Malformed,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Store { .. } | Self::Broker { .. } | Self::Seek { .. } => {
                ErrorClass::Dependency
            }
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            Error::InvalidChunkSize { size: 0 }.class(),
            ErrorClass::Config
        );
        assert_eq!(
            Error::InvalidUserId { user: "abc".into() }.class(),
            ErrorClass::Malformed
        );
        assert_eq!(
            Error::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .class(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            Error::Seek {
                subscription: "s".into(),
                reason: "gone".into()
            }
            .class(),
            ErrorClass::Dependency
        );
    }

    #[test]
    fn json_errors_are_malformed() {
        let err: Error = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert_eq!(err.class(), ErrorClass::Malformed);
    }
}
