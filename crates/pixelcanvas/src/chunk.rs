//! # Chunk Index
//!
//! Maps absolute pixel coordinates to the chunk that stores them and to the
//! pixel's field name inside that chunk document.
//!
//! Chunk indices use floor division and local offsets use the Euclidean
//! remainder, so negative coordinates land in negative chunks with
//! non-negative local keys, and formatting a [`ChunkId`] then parsing it back
//! always recovers the same pair.

use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// Prefix shared by every chunk document id.
pub const CHUNK_ID_PREFIX: &str = "canvas_chunks_";

/// Identifier of a chunk document: `canvas_chunks_{x}_{y}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId {
    pub x: i64,
    pub y: i64,
}

impl ChunkId {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Parses the last `/`-separated segment of a document resource name.
    ///
    /// `projects/p/databases/d/documents/canvas_chunks/canvas_chunks_2_-1`
    /// yields `ChunkId { x: 2, y: -1 }`.
    pub fn from_document_name(name: &str) -> Result<Self> {
        let short = name.rsplit('/').next().unwrap_or(name);
        short.parse()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHUNK_ID_PREFIX}{}_{}", self.x, self.y)
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidChunkId { id: s.to_string() };
        let rest = s.strip_prefix(CHUNK_ID_PREFIX).ok_or_else(invalid)?;
        let (x, y) = rest.split_once('_').ok_or_else(invalid)?;
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }
}

/// Field name of a pixel inside its chunk: `"{localX}_{localY}"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PixelKey {
    pub x: u32,
    pub y: u32,
}

impl PixelKey {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Parses a pixel key and checks it against the chunk size it was
    /// written with.
    ///
    /// A `chunk_size` of zero means "unknown" and only the shape is checked.
    pub fn parse_within(key: &str, chunk_size: i64) -> Result<Self> {
        let parsed: Self = key.parse()?;
        let outside = i64::from(parsed.x) >= chunk_size || i64::from(parsed.y) >= chunk_size;
        if chunk_size > 0 && outside {
            return Err(Error::InvalidPixelKey {
                key: key.to_string(),
                reason: format!("outside chunk of size {chunk_size}"),
            });
        }
        Ok(parsed)
    }
}

impl fmt::Display for PixelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for PixelKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPixelKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };
        let (x, y) = s
            .split_once('_')
            .ok_or_else(|| invalid("expected <localX>_<localY>"))?;
        let x = x.parse().map_err(|_| invalid("localX is not a non-negative integer"))?;
        let y = y.parse().map_err(|_| invalid("localY is not a non-negative integer"))?;
        Ok(Self { x, y })
    }
}

/// Locates the chunk holding pixel `(x, y)` and the pixel's key within it.
///
/// # Errors
///
/// Returns [`Error::InvalidChunkSize`] if `chunk_size <= 0`.
///
/// # Example
///
/// ```
/// use pixelcanvas::locate;
///
/// let (chunk, key) = locate(150, 12, 100).unwrap();
/// assert_eq!(chunk.to_string(), "canvas_chunks_1_0");
/// assert_eq!(key.to_string(), "50_12");
/// ```
pub fn locate(x: i32, y: i32, chunk_size: i32) -> Result<(ChunkId, PixelKey)> {
    if chunk_size <= 0 {
        return Err(Error::InvalidChunkSize {
            size: i64::from(chunk_size),
        });
    }
    let (x, y, size) = (i64::from(x), i64::from(y), i64::from(chunk_size));
    let chunk = ChunkId::new(x.div_euclid(size), y.div_euclid(size));
    // rem_euclid with a positive divisor is in [0, size) and size fits in i32.
    let key = PixelKey::new(x.rem_euclid(size) as u32, y.rem_euclid(size) as u32);
    Ok((chunk, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn locates_example_pixel() {
        let (chunk, key) = locate(150, 12, 100).unwrap();
        assert_eq!(chunk.to_string(), "canvas_chunks_1_0");
        assert_eq!(key.to_string(), "50_12");
    }

    #[test]
    fn negative_coordinates_use_floor_division() {
        let (chunk, key) = locate(-1, -100, 100).unwrap();
        assert_eq!(chunk, ChunkId::new(-1, -1));
        assert_eq!(key, PixelKey::new(99, 0));

        let (chunk, key) = locate(-101, 5, 100).unwrap();
        assert_eq!(chunk, ChunkId::new(-2, 0));
        assert_eq!(key, PixelKey::new(99, 5));
    }

    #[test]
    fn rejects_non_positive_chunk_size() {
        assert_eq!(
            locate(1, 1, 0).unwrap_err(),
            Error::InvalidChunkSize { size: 0 }
        );
        assert!(locate(1, 1, -8).is_err());
    }

    #[test]
    fn parses_document_names() {
        let id = ChunkId::from_document_name(
            "projects/p/databases/(default)/documents/canvas_chunks/canvas_chunks_2_-1",
        )
        .unwrap();
        assert_eq!(id, ChunkId::new(2, -1));
        assert_eq!(
            ChunkId::from_document_name("canvas_chunks_7_8").unwrap(),
            ChunkId::new(7, 8)
        );
    }

    #[test]
    fn rejects_bad_chunk_ids() {
        for bad in [
            "",
            "canvas_chunks_",
            "canvas_chunks_1",
            "canvas_chunks_1_2_3",
            "canvas_chunks_a_2",
            "chunks_1_2",
        ] {
            assert!(bad.parse::<ChunkId>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn pixel_keys_are_bounded_by_chunk_size() {
        assert_eq!(
            PixelKey::parse_within("5_5", 10).unwrap(),
            PixelKey::new(5, 5)
        );
        assert!(PixelKey::parse_within("10_5", 10).is_err());
        assert!(PixelKey::parse_within("-1_5", 10).is_err());
        assert!(PixelKey::parse_within("5", 10).is_err());
        // unknown size only checks the shape
        assert!(PixelKey::parse_within("4000_1", 0).is_ok());
    }

    proptest! {
        #[test]
        fn chunk_id_round_trips(x in any::<i32>(), y in any::<i32>(), size in 1..=i32::MAX) {
            let (chunk, _) = locate(x, y, size).unwrap();
            let parsed: ChunkId = chunk.to_string().parse().unwrap();
            prop_assert_eq!(parsed, chunk);
            prop_assert_eq!(parsed.x, i64::from(x).div_euclid(i64::from(size)));
            prop_assert_eq!(parsed.y, i64::from(y).div_euclid(i64::from(size)));
        }

        #[test]
        fn local_key_is_inside_chunk(x in any::<i32>(), y in any::<i32>(), size in 1..=4096i32) {
            let (chunk, key) = locate(x, y, size).unwrap();
            prop_assert!(i64::from(key.x) < i64::from(size));
            prop_assert!(i64::from(key.y) < i64::from(size));
            prop_assert_eq!(chunk.x * i64::from(size) + i64::from(key.x), i64::from(x));
            prop_assert_eq!(chunk.y * i64::from(size) + i64::from(key.y), i64::from(y));
            let reparsed = PixelKey::parse_within(&key.to_string(), i64::from(size)).unwrap();
            prop_assert_eq!(reparsed, key);
        }
    }
}
