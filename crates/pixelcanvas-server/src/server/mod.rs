//! Server-side components of the pixelcanvas service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI and environment configuration.
//! - [`service`] - HTTP routes over the [`pixelcanvas::Canvas`] handlers.
//! - [`pump`] - local delivery loops standing in for push subscriptions and
//!   the store's change trigger.
//! - [`telemetry`] - structured logging and optional OpenTelemetry export.

pub mod config;
pub mod pump;
pub mod service;
pub mod telemetry;
