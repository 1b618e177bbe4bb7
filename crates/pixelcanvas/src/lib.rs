#![doc = include_str!("../README.md")]

mod broker;
mod canvas;
mod chunk;
mod coalesce;
mod config;
mod decode;
pub mod envelope;
mod error;
mod gate;
mod publish;
mod reset;
mod store;
mod time;

pub use crate::broker::*;
pub use crate::canvas::*;
pub use crate::chunk::*;
pub use crate::coalesce::*;
pub use crate::config::*;
pub use crate::decode::*;
pub use crate::error::*;
pub use crate::gate::*;
pub use crate::publish::*;
pub use crate::reset::*;
pub use crate::store::*;
pub use crate::time::*;
