//! Document store collaborator.
//!
//! The pipeline needs point reads, merge writes, overwrites, all-or-nothing
//! batches and deletes. [`DocumentStore`] captures exactly that surface;
//! [`MemoryStore`] implements it in process and additionally emits
//! change-capture payloads the way the hosted store's trigger does.

mod interface;
mod memory;
mod value;

pub use interface::*;
pub use memory::*;
pub use value::*;
