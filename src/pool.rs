//! The static data pool: a sparse, offset-addressed table of previously
//! parsed values used for deduplication and shared references within one file.
//!
//! The pool is an arena of fixed-size slots addressed by integer offset, never
//! by pointer. Its capacity is declared once in the stream; every referenced
//! offset must fall below it. A slot is written at most once and is read-only
//! afterwards. Entries may reference earlier slots from inside their own
//! payloads, making the pool a directed acyclic value graph rather than a flat
//! table — which is why the whole static-data block is parsed before any
//! ordinary read dereferences into it.

use crate::error::{FbomError, Result};
use crate::format::PoolKind;
use crate::names::NameTable;
use crate::object::FbomObject;
use crate::typed::FbomType;
use crate::value::FbomData;

/// A populated pool slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolValue {
    /// A shared type descriptor.
    Type(FbomType),
    /// A shared data cell.
    Data(FbomData),
    /// A shared object subtree.
    Object(FbomObject),
    /// A per-file name table.
    NameTable(NameTable),
}

impl PoolValue {
    /// The kind tag this value serializes under.
    pub fn kind(&self) -> PoolKind {
        match self {
            Self::Type(_) => PoolKind::Type,
            Self::Data(_) => PoolKind::Data,
            Self::Object(_) => PoolKind::Object,
            Self::NameTable(_) => PoolKind::NameTable,
        }
    }
}

/// The offset-addressed deduplication table for one read session.
#[derive(Debug, Default)]
pub struct StaticDataPool {
    slots: Vec<Option<PoolValue>>,
}

impl StaticDataPool {
    /// Allocates a pool with the slot count declared in the stream.
    pub fn with_capacity(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }

    /// The declared slot count.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Bounds-checks an offset against the declared count.
    pub fn check_bounds(&self, offset: u32) -> Result<usize> {
        let idx = offset as usize;
        if idx >= self.slots.len() {
            return Err(FbomError::Format(format!(
                "Static offset {offset} out of bounds (declared count {})",
                self.slots.len()
            )));
        }
        Ok(idx)
    }

    /// Populates a slot. Write-once: rewriting a populated slot violates the
    /// format's ordering guarantees.
    pub fn put(&mut self, offset: u32, value: PoolValue) -> Result<()> {
        let idx = self.check_bounds(offset)?;
        let slot = &mut self.slots[idx];
        if slot.is_some() {
            return Err(FbomError::Invariant(format!(
                "Static slot {offset} written twice"
            )));
        }
        *slot = Some(value);
        Ok(())
    }

    /// Dereferences a slot that must already be populated.
    ///
    /// An empty slot here means the stream referenced the pool before the
    /// static-data block populated it — an ordering violation, not a
    /// recoverable format error.
    pub fn get(&self, offset: u32) -> Result<&PoolValue> {
        let idx = self.check_bounds(offset)?;
        self.slots[idx].as_ref().ok_or_else(|| {
            FbomError::Invariant(format!(
                "Static slot {offset} dereferenced before it was populated"
            ))
        })
    }

    /// Dereferences a slot expecting a type descriptor.
    pub fn get_type(&self, offset: u32) -> Result<&FbomType> {
        match self.get(offset)? {
            PoolValue::Type(ty) => Ok(ty),
            other => Err(Self::kind_mismatch(offset, PoolKind::Type, other)),
        }
    }

    /// Dereferences a slot expecting a data cell.
    pub fn get_data(&self, offset: u32) -> Result<&FbomData> {
        match self.get(offset)? {
            PoolValue::Data(cell) => Ok(cell),
            other => Err(Self::kind_mismatch(offset, PoolKind::Data, other)),
        }
    }

    /// Dereferences a slot expecting an object.
    pub fn get_object(&self, offset: u32) -> Result<&FbomObject> {
        match self.get(offset)? {
            PoolValue::Object(node) => Ok(node),
            other => Err(Self::kind_mismatch(offset, PoolKind::Object, other)),
        }
    }

    /// Iterates slots in offset order, populated or not.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<&PoolValue>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (i as u32, slot.as_ref()))
    }

    fn kind_mismatch(offset: u32, expected: PoolKind, found: &PoolValue) -> FbomError {
        FbomError::Invariant(format!(
            "Static slot {offset} holds {:?}, expected {:?}",
            found.kind(),
            expected
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_offset_is_a_format_error() {
        let pool = StaticDataPool::with_capacity(2);
        assert!(matches!(pool.check_bounds(2), Err(FbomError::Format(_))));
        assert!(matches!(pool.get(9), Err(FbomError::Format(_))));
    }

    #[test]
    fn slots_are_write_once() {
        let mut pool = StaticDataPool::with_capacity(1);
        pool.put(0, PoolValue::Type(FbomType::uint32())).unwrap();
        let err = pool.put(0, PoolValue::Type(FbomType::uint8()));
        assert!(matches!(err, Err(FbomError::Invariant(_))));
    }

    #[test]
    fn unpopulated_dereference_is_an_invariant_violation() {
        let pool = StaticDataPool::with_capacity(3);
        assert!(matches!(pool.get(1), Err(FbomError::Invariant(_))));
    }

    #[test]
    fn kind_mismatch_is_an_invariant_violation() {
        let mut pool = StaticDataPool::with_capacity(1);
        pool.put(0, PoolValue::Type(FbomType::uint32())).unwrap();
        assert!(pool.get_type(0).is_ok());
        assert!(matches!(pool.get_object(0), Err(FbomError::Invariant(_))));
    }
}
