//! Message broker collaborator.
//!
//! - [`MessageBroker`] - publish, list subscriptions of a topic, seek.
//! - [`MemoryBroker`] - in-process topics and pull subscriptions with
//!   time-based seek.

mod interface;
mod memory;

pub use interface::*;
pub use memory::*;
