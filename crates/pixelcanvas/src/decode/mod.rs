//! # Change Decoder
//!
//! Turns the store's change-capture payload for a chunk document into a
//! compact [`ChunkUpdateEvent`].
//!
//! The store encodes every value as a tagged wrapper (`{"integerValue":
//! "7"}`, `{"mapValue": {"fields": {...}}}`, ...), and depending on the
//! delivery path the tags arrive camelCase or snake_case. [`wire`] resolves
//! tags through a fixed spelling table and coerces numbers; [`chunk`] walks a
//! chunk document.

mod chunk;
pub mod wire;

pub use chunk::*;
