//! # Pixel Write Coalescer
//!
//! Groups a batch of [`PixelWrite`]s into one merge patch per chunk. The
//! coalescer is pure: it either returns every patch of the batch or an error,
//! so a failed batch never reaches the store.

use crate::{ChunkId, Error, FieldValue, Fields, PixelKey, Result, locate};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map::Entry};

/// A single pixel draw request as sent by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWrite {
    pub x: i32,
    pub y: i32,
    pub color: u8,
    /// Opaque user id. Must be a decimal `i64` to be stored.
    pub user: String,
    /// Client-side timestamp, carried but not interpreted.
    #[serde(default)]
    pub timestamp: String,
}

impl PixelWrite {
    /// The user id as stored in chunk documents.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUserId`] if `user` is not a decimal `i64`.
    pub fn user_id(&self) -> Result<i64> {
        self.user.parse().map_err(|_| Error::InvalidUserId {
            user: self.user.clone(),
        })
    }

    /// Canonical decimal rendering of [`PixelWrite::user_id`], used as the
    /// user record's document id. `"042"` and `"+42"` both become `"42"`.
    pub fn user_key(&self) -> Result<String> {
        self.user_id().map(|user| user.to_string())
    }
}

/// What to do when several writes of one batch land in the same chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CoalescePolicy {
    /// The first write to a chunk defines its patch; later writes to the same
    /// chunk in the batch are dropped.
    #[default]
    FirstWriteWins,
    /// The last write to a chunk replaces earlier ones.
    LastWriteWins,
    /// Every pixel is kept; a later write to the same pixel replaces an
    /// earlier one.
    MergePixels,
}

impl CoalescePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstWriteWins => "first-write-wins",
            Self::LastWriteWins => "last-write-wins",
            Self::MergePixels => "merge-pixels",
        }
    }
}

impl fmt::Display for CoalescePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoalescePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-write-wins" => Ok(Self::FirstWriteWins),
            "last-write-wins" => Ok(Self::LastWriteWins),
            "merge-pixels" => Ok(Self::MergePixels),
            other => Err(Error::Config {
                reason: format!(
                    "unknown coalesce policy {other:?} (expected first-write-wins, last-write-wins or merge-pixels)"
                ),
            }),
        }
    }
}

/// Stored value of one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelPatch {
    pub color: u8,
    pub user: i64,
}

/// Fields merged into one chunk document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPatch {
    pub size: i32,
    pub pixels: BTreeMap<PixelKey, PixelPatch>,
}

impl ChunkPatch {
    fn empty(size: i32) -> Self {
        Self {
            size,
            pixels: BTreeMap::new(),
        }
    }

    fn single(size: i32, key: PixelKey, pixel: PixelPatch) -> Self {
        let mut patch = Self::empty(size);
        patch.pixels.insert(key, pixel);
        patch
    }

    /// Document fields for a merge write. `lastUpdated` is the store's
    /// server timestamp sentinel.
    pub fn to_fields(&self) -> Fields {
        let pixels = self
            .pixels
            .iter()
            .map(|(key, pixel)| {
                let value = Fields::from([
                    ("color".to_string(), FieldValue::from(pixel.color)),
                    ("user".to_string(), FieldValue::from(pixel.user)),
                ]);
                (key.to_string(), FieldValue::Map(value))
            })
            .collect();
        Fields::from([
            ("size".to_string(), FieldValue::from(self.size)),
            ("pixels".to_string(), FieldValue::Map(pixels)),
            ("lastUpdated".to_string(), FieldValue::ServerTimestamp),
        ])
    }
}

/// Result of coalescing one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoalescedBatch {
    pub patches: BTreeMap<ChunkId, ChunkPatch>,
    /// Canonical user id of every processed write, in input order.
    pub users: Vec<String>,
}

/// Coalesces `writes` into one [`ChunkPatch`] per chunk.
///
/// # Errors
///
/// - [`Error::InvalidChunkSize`] if `chunk_size <= 0`.
/// - [`Error::InvalidUserId`] if any write's user id is not a decimal `i64`;
///   the whole batch is rejected.
pub fn coalesce(
    writes: &[PixelWrite],
    chunk_size: i32,
    policy: CoalescePolicy,
) -> Result<CoalescedBatch> {
    let mut batch = CoalescedBatch::default();

    for write in writes {
        let user = write.user_id()?;
        let (chunk, key) = locate(write.x, write.y, chunk_size)?;
        let pixel = PixelPatch {
            color: write.color,
            user,
        };
        batch.users.push(user.to_string());

        match policy {
            CoalescePolicy::FirstWriteWins => match batch.patches.entry(chunk) {
                Entry::Vacant(slot) => {
                    slot.insert(ChunkPatch::single(chunk_size, key, pixel));
                }
                Entry::Occupied(_) => {
                    tracing::debug!(
                        %chunk,
                        %key,
                        "Chunk already patched in this batch, dropping write"
                    );
                }
            },
            CoalescePolicy::LastWriteWins => {
                batch
                    .patches
                    .insert(chunk, ChunkPatch::single(chunk_size, key, pixel));
            }
            CoalescePolicy::MergePixels => {
                batch
                    .patches
                    .entry(chunk)
                    .or_insert_with(|| ChunkPatch::empty(chunk_size))
                    .pixels
                    .insert(key, pixel);
            }
        }
    }

    Ok(batch)
}
