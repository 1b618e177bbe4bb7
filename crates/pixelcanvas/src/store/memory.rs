//! In-process document store.
//!
//! [`MemoryStore`] keeps documents in a map guarded by a `parking_lot` mutex,
//! applies batches atomically, resolves server timestamps to a single commit
//! time per batch, and broadcasts a [`ChangeEvent`] for each written or
//! deleted document.
//! The event payload has the same JSON shape the hosted store delivers to its
//! change triggers, so the decoder can consume it unchanged.

use super::{Document, DocumentStore, FieldValue, Fields, Write, WriteMode};
use crate::{Error, Result, TimeSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_FEED_CAPACITY: usize = 1024;

/// A change-capture notification for one document.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    /// `{"value": <document>, "oldValue": <document>?}` in wire format. A
    /// deletion carries only `oldValue`.
    pub payload: Value,
}

#[derive(Clone, Debug)]
struct StoredDocument {
    fields: Fields,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

/// A [`DocumentStore`] backed by process memory.
pub struct MemoryStore {
    root: String,
    clock: Arc<dyn TimeSource>,
    documents: Mutex<BTreeMap<(String, String), StoredDocument>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    /// Creates an empty store whose document names live under
    /// `projects/{project}/databases/{database}/documents`.
    pub fn new(project: &str, database: &str, clock: Arc<dyn TimeSource>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            root: format!("projects/{project}/databases/{database}/documents"),
            clock,
            documents: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    /// Subscribes to change-capture events for writes committed after this
    /// call.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    fn deletion_event(&self, key: (String, String), stored: &StoredDocument) -> ChangeEvent {
        let old = self.to_document(&key.0, &key.1, stored).to_wire();
        ChangeEvent {
            collection: key.0,
            id: key.1,
            payload: json!({ "oldValue": old }),
        }
    }

    fn broadcast(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // No receivers is fine: nobody is listening for changes.
            let _ = self.changes.send(event);
        }
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.root)
    }

    fn to_document(&self, collection: &str, id: &str, stored: &StoredDocument) -> Document {
        Document {
            name: self.document_name(collection, id),
            fields: stored.fields.clone(),
            create_time: stored.create_time,
            update_time: stored.update_time,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let documents = self.documents.lock();
        Ok(documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|stored| self.to_document(collection, id, stored)))
    }

    async fn batch_write(&self, writes: Vec<Write>) -> Result<()> {
        // Validate everything before touching state so a bad write cannot
        // leave half a batch behind.
        for write in &writes {
            if write.collection.is_empty() || write.id.is_empty() || write.id.contains('/') {
                return Err(Error::Store {
                    context: format!(
                        "invalid document path {:?}/{:?}",
                        write.collection, write.id
                    ),
                });
            }
        }

        let commit_time = self.clock.now();
        let mut touched: Vec<(String, String)> = Vec::new();
        let mut before: BTreeMap<(String, String), Option<Document>> = BTreeMap::new();

        let events = {
            let mut documents = self.documents.lock();
            for write in writes {
                let key = (write.collection, write.id);
                if !before.contains_key(&key) {
                    let old = documents
                        .get(&key)
                        .map(|stored| self.to_document(&key.0, &key.1, stored));
                    before.insert(key.clone(), old);
                    touched.push(key.clone());
                }
                let resolved = resolve_server_timestamps(write.fields, commit_time);
                match documents.get_mut(&key) {
                    Some(existing) => {
                        match write.mode {
                            WriteMode::Merge => merge_fields(&mut existing.fields, resolved),
                            WriteMode::Set => existing.fields = resolved,
                        }
                        existing.update_time = commit_time;
                    }
                    None => {
                        documents.insert(
                            key,
                            StoredDocument {
                                fields: resolved,
                                create_time: commit_time,
                                update_time: commit_time,
                            },
                        );
                    }
                }
            }

            touched
                .into_iter()
                .filter_map(|key| {
                    let stored = documents.get(&key)?;
                    let value = self.to_document(&key.0, &key.1, stored).to_wire();
                    let mut payload = json!({ "value": value });
                    if let Some(Some(old)) = before.remove(&key) {
                        payload["oldValue"] = old.to_wire();
                    }
                    Some(ChangeEvent {
                        collection: key.0,
                        id: key.1,
                        payload,
                    })
                })
                .collect::<Vec<_>>()
        };

        self.broadcast(events);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let key = (collection.to_string(), id.to_string());
        let removed = self.documents.lock().remove(&key);
        let Some(stored) = removed else {
            return Ok(false);
        };
        self.broadcast(vec![self.deletion_event(key, &stored)]);
        Ok(true)
    }

    async fn delete_collection(&self, collection: &str) -> Result<usize> {
        let events = {
            let mut documents = self.documents.lock();
            let keys: Vec<_> = documents
                .keys()
                .filter(|(c, _)| c == collection)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| {
                    let stored = documents.remove(&key)?;
                    Some(self.deletion_event(key, &stored))
                })
                .collect::<Vec<_>>()
        };
        let removed = events.len();
        self.broadcast(events);
        tracing::debug!(collection, removed, "Deleted collection");
        Ok(removed)
    }
}

/// Unions `patch` into `target`, recursing where both sides hold a map.
fn merge_fields(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(FieldValue::Map(existing)), FieldValue::Map(nested)) => {
                merge_fields(existing, nested);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn resolve_server_timestamps(fields: Fields, at: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                FieldValue::ServerTimestamp => FieldValue::Timestamp(at),
                FieldValue::Map(nested) => FieldValue::Map(resolve_server_timestamps(nested, at)),
                other => other,
            };
            (k, v)
        })
        .collect()
}
