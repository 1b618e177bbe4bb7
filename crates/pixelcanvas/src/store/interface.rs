use super::{Document, Fields};
use crate::Result;
use async_trait::async_trait;

/// How a queued write combines with the existing document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Union the given fields into the document, recursing into nested maps.
    /// Fields absent from the patch are left untouched.
    Merge,
    /// Replace the whole document.
    Set,
}

/// One queued write of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    pub collection: String,
    pub id: String,
    pub fields: Fields,
    pub mode: WriteMode,
}

impl Write {
    pub fn merge(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            fields,
            mode: WriteMode::Merge,
        }
    }

    pub fn set(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            fields,
            mode: WriteMode::Set,
        }
    }
}

/// The document store operations the pipeline depends on.
///
/// Implementations are expected to be shared across tasks behind an `Arc`.
/// Every call runs to completion or fails; callers do not retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document, `Ok(None)` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Commits every write or none of them.
    async fn batch_write(&self, writes: Vec<Write>) -> Result<()>;

    /// Deletes one document. `Ok(false)` if it did not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Deletes every document of `collection`, returning how many were
    /// removed. Writes racing with the delete may survive it.
    async fn delete_collection(&self, collection: &str) -> Result<usize>;

    async fn merge_write(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.batch_write(vec![Write::merge(collection, id, fields)])
            .await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.batch_write(vec![Write::set(collection, id, fields)]).await
    }
}
