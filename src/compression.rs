//! Pluggable compression backend for flagged-compressed data cells.
//!
//! The format itself does not prescribe an algorithm: a cell whose
//! `COMPRESSED` flag is set records an algorithm id next to its payload, and
//! the session's registry maps that id to a [`Compressor`]. ID 0 is reserved
//! for pass-through.

use std::borrow::Cow;

use crate::error::{FbomError, Result};

/// Interface for compression algorithms.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// The unique algorithm id recorded next to compressed payloads.
    /// 0 is reserved for no compression.
    fn id(&self) -> u8;

    /// Compresses the data. May borrow the input when no transformation is
    /// performed.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Decompresses the data back to its original bytes.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

/// Pass-through "compressor" (ID 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

/// LZ4 block compression (ID 1), available with the `lz4_flex` feature.
#[cfg(feature = "lz4_flex")]
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        1
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        lz4_flex::decompress_size_prepended(data)
            .map(Cow::Owned)
            .map_err(|e| FbomError::Compression(e.to_string()))
    }
}

/// Registry mapping algorithm ids to [`Compressor`] implementations.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Creates a registry with the built-in algorithms registered:
    /// ID 0 pass-through, ID 1 LZ4 when the `lz4_flex` feature is enabled.
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: Vec::new(),
        };
        reg.register(Box::new(NoCompression));
        #[cfg(feature = "lz4_flex")]
        reg.register(Box::new(Lz4Compressor));
        reg
    }

    /// Registers a compressor under its own id, replacing any previous
    /// registration for that id.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = algo.id() as usize;
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a compressor by id.
    ///
    /// # Errors
    /// [`FbomError::Compression`] when the id is not registered.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        self.algorithms
            .get(usize::from(id))
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| {
                FbomError::Compression(format!("Algorithm ID {id} is not registered"))
            })
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_borrows() {
        let data = [1u8, 2, 3];
        let out = NoCompression.compress(&data).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(NoCompression.decompress(&out).unwrap().as_ref(), &data);
    }

    #[test]
    fn registry_rejects_unknown_ids() {
        let reg = CompressorRegistry::new();
        assert!(reg.get(0).is_ok());
        assert!(reg.get(7).is_err());
    }

    #[cfg(feature = "lz4_flex")]
    #[test]
    fn lz4_round_trips() {
        let data = vec![0xABu8; 4096];
        let compressed = Lz4Compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(Lz4Compressor.decompress(&compressed).unwrap().as_ref(), &data[..]);
    }
}
