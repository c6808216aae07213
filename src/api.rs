//! The convenience facade for whole-stream operations with default sessions.

use std::path::Path;

use crate::error::Result;
use crate::object::FbomObject;
use crate::reader::FbomReader;
use crate::writer::FbomWriter;

/// The main entry point for one-shot encode/decode calls.
///
/// Callers needing a configured session (external-reference base path,
/// marshalers, tolerant mode) should use [`FbomReader`] and [`FbomWriter`]
/// directly.
#[derive(Debug)]
pub struct Fbom;

impl Fbom {
    /// Decodes a byte stream into its single root object.
    pub fn deserialize(bytes: &[u8]) -> Result<FbomObject> {
        FbomReader::new().deserialize(bytes)
    }

    /// Encodes an object graph into a little-endian stream.
    pub fn serialize(root: &FbomObject) -> Result<Vec<u8>> {
        FbomWriter::new().serialize(root)
    }

    /// Memory-maps and decodes a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<FbomObject> {
        FbomReader::new().load_from_file(path)
    }

    /// Encodes an object graph and writes it to a file.
    pub fn save_to_file<P: AsRef<Path>>(path: P, root: &FbomObject) -> Result<()> {
        FbomWriter::new().write_to_file(path, root)
    }
}
