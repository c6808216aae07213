//! The write-side engine: turns an object graph back into a byte stream.
//!
//! Writing is a two-pass pipeline. A census pass walks the graph counting
//! every type descriptor and data cell by value; anything referenced more than
//! once is assigned a slot in the static data pool, and every property name is
//! collected into the file's name table. The emit pass then writes the header,
//! one static-data block (name table first, then types, then cells, so that
//! cell entries can reference earlier type slots), and finally the root object
//! with `Static` locations at every deduplicated site.
//!
//! Contract: two cells that compare equal serialize to byte-identical output —
//! the property the pool's deduplication relies on.

use std::path::Path;

use crate::error::{FbomError, Result};
use crate::format::{
    DataLocation, FbomCommand, PoolKind, StringKind, pack_string_header, MAGIC_BYTES,
    STATIC_DATA_RESERVED,
};
use crate::names::NameTable;
use crate::object::FbomObject;
use crate::stream::{ByteWriter, Endianness};
use crate::typed::FbomType;
use crate::value::FbomData;
use crate::version::CURRENT_VERSION;

/// The symmetric encoder for FBOM streams.
#[derive(Debug)]
pub struct FbomWriter {
    endianness: Endianness,
}

impl Default for FbomWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FbomWriter {
    /// Creates a writer emitting little-endian streams.
    pub fn new() -> Self {
        Self {
            endianness: Endianness::Little,
        }
    }

    /// Creates a writer emitting in the given byte order. Only container
    /// integers follow it; cell payload bytes are copied verbatim.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self { endianness }
    }

    /// Serializes a single root object into a complete stream.
    pub fn serialize(&self, root: &FbomObject) -> Result<Vec<u8>> {
        let pool = PoolIndex::build(root);
        let mut w = ByteWriter::new(self.endianness);

        // Header.
        w.write_bytes(&MAGIC_BYTES);
        w.write_u8(self.endianness.flag_byte());
        w.write_u32(CURRENT_VERSION.to_u32());

        pool.emit_static_block(&mut w)?;
        write_object(&mut w, root, &pool)?;

        Ok(w.into_inner())
    }

    /// Serializes and writes the stream to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, root: &FbomObject) -> Result<()> {
        let bytes = self.serialize(root)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Serializes an object as a self-contained payload for an embedded object
/// cell: a complete little-endian stream, decodable on its own.
pub(crate) fn serialize_object_payload(node: &FbomObject) -> Result<Vec<u8>> {
    FbomWriter::new().serialize(node)
}

/// Serializes an ordered array of cells as a self-contained payload:
/// `[u32 count]` then each cell fully in place, little-endian.
pub(crate) fn serialize_array_payload(cells: &[FbomData]) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new(Endianness::Little);
    w.write_u32(cells.len() as u32);
    let empty = PoolIndex::default();
    for cell in cells {
        write_cell(&mut w, cell, &empty)?;
    }
    Ok(w.into_inner())
}

// --- DEDUP CENSUS ---

/// Offsets assigned to pooled values, in first-encounter order.
///
/// Lookup is a linear scan by value equality; streams are written far less
/// often than they are read and graphs stay small enough for this to be a
/// non-issue.
#[derive(Debug, Default)]
pub(crate) struct PoolIndex {
    name_table: NameTable,
    types: Vec<FbomType>,
    cells: Vec<FbomData>,
}

impl PoolIndex {
    fn build(root: &FbomObject) -> Self {
        let mut type_counts: Vec<(FbomType, usize)> = Vec::new();
        let mut cell_counts: Vec<(FbomData, usize)> = Vec::new();
        let mut name_table = NameTable::new();

        count_node(root, &mut type_counts, &mut cell_counts, &mut name_table);

        Self {
            name_table,
            types: type_counts
                .into_iter()
                .filter(|(_, n)| *n >= 2)
                .map(|(ty, _)| ty)
                .collect(),
            cells: cell_counts
                .into_iter()
                .filter(|(_, n)| *n >= 2)
                .map(|(cell, _)| cell)
                .collect(),
        }
    }

    fn name_table_slots(&self) -> u32 {
        u32::from(!self.name_table.is_empty())
    }

    fn slot_count(&self) -> u32 {
        self.name_table_slots() + self.types.len() as u32 + self.cells.len() as u32
    }

    fn type_offset(&self, ty: &FbomType) -> Option<u32> {
        self.types
            .iter()
            .position(|t| t == ty)
            .map(|i| self.name_table_slots() + i as u32)
    }

    fn cell_offset(&self, cell: &FbomData) -> Option<u32> {
        self.cells
            .iter()
            .position(|c| c == cell)
            .map(|i| self.name_table_slots() + self.types.len() as u32 + i as u32)
    }

    /// Emits the static-data block, or nothing when the pool is empty.
    fn emit_static_block(&self, w: &mut ByteWriter) -> Result<()> {
        let count = self.slot_count();
        if count == 0 {
            return Ok(());
        }

        w.write_u8(FbomCommand::StaticDataStart.as_u8());
        w.write_u32(count);
        w.write_bytes(&[0u8; STATIC_DATA_RESERVED]);

        let mut offset = 0u32;
        if !self.name_table.is_empty() {
            w.write_u32(offset);
            w.write_u8(PoolKind::NameTable.as_u8());
            write_name_table(w, &self.name_table)?;
            offset += 1;
        }
        for ty in &self.types {
            w.write_u32(offset);
            w.write_u8(PoolKind::Type.as_u8());
            write_type_inline(w, ty)?;
            offset += 1;
        }
        for cell in &self.cells {
            w.write_u32(offset);
            w.write_u8(PoolKind::Data.as_u8());
            // The cell body may still reference an earlier TYPE slot.
            write_cell_body(w, cell, self)?;
            offset += 1;
        }

        w.write_u8(FbomCommand::StaticDataEnd.as_u8());
        Ok(())
    }
}

fn bump(counts: &mut Vec<(FbomType, usize)>, ty: &FbomType) {
    if let Some(entry) = counts.iter_mut().find(|(t, _)| t == ty) {
        entry.1 += 1;
    } else {
        counts.push((ty.clone(), 1));
    }
}

fn bump_cell(counts: &mut Vec<(FbomData, usize)>, cell: &FbomData) {
    if let Some(entry) = counts.iter_mut().find(|(c, _)| c == cell) {
        entry.1 += 1;
    } else {
        counts.push((cell.clone(), 1));
    }
}

fn count_node(
    node: &FbomObject,
    types: &mut Vec<(FbomType, usize)>,
    cells: &mut Vec<(FbomData, usize)>,
    names: &mut NameTable,
) {
    if node.external_ref().is_some() {
        return;
    }
    bump(types, node.ty());
    for (name, cell) in node.properties() {
        names.add(name.as_str());
        let name_cell = FbomData::from_name(name);
        bump(types, name_cell.ty());
        bump_cell(cells, &name_cell);
        bump(types, cell.ty());
        bump_cell(cells, cell);
    }
    for child in node.children() {
        count_node(child, types, cells, names);
    }
}

// --- ENCODING HELPERS ---

pub(crate) fn write_string(w: &mut ByteWriter, text: &str, kind: StringKind) -> Result<()> {
    let header = pack_string_header(text.len(), kind)?;
    w.write_u32(header);
    w.write_bytes(text.as_bytes());
    Ok(())
}

/// Full in-place type encoding, parent chain first.
fn write_type_inline(w: &mut ByteWriter, ty: &FbomType) -> Result<()> {
    match &ty.parent {
        Some(parent) => {
            w.write_u8(1);
            write_type_inline(w, parent)?;
        }
        None => w.write_u8(0),
    }
    write_string(w, &ty.name, StringKind::Utf8)?;
    w.write_u64(ty.size.to_wire());
    match ty.native {
        Some(id) => {
            w.write_u8(1);
            w.write_u64(id.as_u64());
        }
        None => w.write_u8(0),
    }
    Ok(())
}

/// Location-prefixed type: a pool reference when the census deduplicated it.
fn write_type_ref(w: &mut ByteWriter, ty: &FbomType, pool: &PoolIndex) -> Result<()> {
    if let Some(offset) = pool.type_offset(ty) {
        w.write_u8(DataLocation::Static.as_u8());
        w.write_u32(offset);
        return Ok(());
    }
    w.write_u8(DataLocation::InPlace.as_u8());
    write_type_inline(w, ty)
}

/// Cell body without the location byte: type ref, flags, length, payload.
fn write_cell_body(w: &mut ByteWriter, cell: &FbomData, pool: &PoolIndex) -> Result<()> {
    write_type_ref(w, cell.ty(), pool)?;
    w.write_u32(cell.flags().bits());
    w.write_u32(cell.len() as u32);
    // Opaque payload: copied verbatim, never byte-swapped.
    w.write_bytes(cell.bytes());
    Ok(())
}

/// Location-prefixed cell: a pool reference when the census deduplicated it.
fn write_cell(w: &mut ByteWriter, cell: &FbomData, pool: &PoolIndex) -> Result<()> {
    if let Some(offset) = pool.cell_offset(cell) {
        w.write_u8(DataLocation::Static.as_u8());
        w.write_u32(offset);
        return Ok(());
    }
    w.write_u8(DataLocation::InPlace.as_u8());
    write_cell_body(w, cell, pool)
}

fn write_name_table(w: &mut ByteWriter, table: &NameTable) -> Result<()> {
    w.write_u32(table.len() as u32);
    for (text, id) in table.iter() {
        write_string(w, text, StringKind::Utf8)?;
        w.write_u64(id.as_u64());
    }
    Ok(())
}

fn write_object(w: &mut ByteWriter, node: &FbomObject, pool: &PoolIndex) -> Result<()> {
    w.write_u8(FbomCommand::ObjectStart.as_u8());
    w.write_u64(node.unique_id());

    if let Some(ext) = node.external_ref() {
        w.write_u8(DataLocation::ExtRef.as_u8());
        write_string(w, &ext.file, StringKind::Utf8)?;
        w.write_u32(ext.index);
        w.write_u32(ext.flags);
        return Ok(());
    }

    w.write_u8(DataLocation::InPlace.as_u8());
    write_type_ref(w, node.ty(), pool)?;

    for (name, cell) in node.properties() {
        w.write_u8(FbomCommand::DefineProperty.as_u8());
        write_cell(w, &FbomData::from_name(name), pool)?;
        write_cell(w, cell, pool)?;
    }
    for child in node.children() {
        write_object(w, child, pool)?;
    }

    w.write_u8(FbomCommand::ObjectEnd.as_u8());
    Ok(())
}

impl FbomWriter {
    /// Serializes with an explicit check that the graph has a writable root.
    ///
    /// An external-reference node cannot be a stream root: it carries no type
    /// or payload of its own.
    pub fn serialize_checked(&self, root: &FbomObject) -> Result<Vec<u8>> {
        if root.external_ref().is_some() {
            return Err(FbomError::Format(
                "An external reference cannot be a stream root".into(),
            ));
        }
        self.serialize(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;

    #[test]
    fn equal_cells_encode_byte_identically() {
        let pool = PoolIndex::default();
        let a = FbomData::from_u64(42);
        let b = FbomData::from_u64(42);

        let mut wa = ByteWriter::new(Endianness::Little);
        write_cell(&mut wa, &a, &pool).unwrap();
        let mut wb = ByteWriter::new(Endianness::Little);
        write_cell(&mut wb, &b, &pool).unwrap();

        assert_eq!(wa.into_inner(), wb.into_inner());
    }

    #[test]
    fn census_pools_only_repeated_values() {
        let mut root = FbomObject::new(FbomType::structure("Scene", 0));
        root.set_property(Name::new("a"), FbomData::from_u32(7));
        root.set_property(Name::new("b"), FbomData::from_u32(7));
        root.set_property(Name::new("c"), FbomData::from_u32(9));

        let pool = PoolIndex::build(&root);
        // u32(7) twice -> pooled; u32(9) once -> inline.
        assert!(pool.cell_offset(&FbomData::from_u32(7)).is_some());
        assert!(pool.cell_offset(&FbomData::from_u32(9)).is_none());
        // The u32 type itself appeared three times.
        assert!(pool.type_offset(&FbomType::uint32()).is_some());
    }

    #[test]
    fn dedup_shrinks_the_stream() {
        let big = FbomData::from_byte_buffer(&[0x5A; 512]);
        let mut root = FbomObject::new(FbomType::structure("Scene", 0));
        for key in ["a", "b", "c", "d"] {
            root.set_property(Name::new(key), big.clone());
        }

        let bytes = FbomWriter::new().serialize(&root).unwrap();
        // Four references, one payload: well under four copies.
        assert!(bytes.len() < 4 * 512);
    }
}
