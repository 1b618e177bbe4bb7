//! HTTP service over the canvas pipeline.
//!
//! ## Structure
//!
//! - [`handler`] - axum routes and shared state (`AppState`).
//! - [`error`] - mapping of pipeline errors to HTTP responses.

pub mod error;
pub mod handler;
