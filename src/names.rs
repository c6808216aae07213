//! Name interning: per-file `NameTable`s merged into an explicit, injectable
//! process-wide `NameRegistry`.
//!
//! Property keys and type names appear many times across a file set;
//! interning them gives every distinct string one stable 64-bit id. Ids are
//! derived by hashing the string with a fixed seed, so writer and reader agree
//! on ids without shipping the registry itself. The registry only grows, never
//! shrinks.

use std::hash::Hasher;
use std::sync::Mutex;

use indexmap::IndexMap;
use twox_hash::XxHash64;

use crate::error::{FbomError, Result};

const NAME_HASH_SEED: u64 = 0xF_B0_4D;

/// A stable identifier for an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u64);

impl NameId {
    /// Derives the id for a string. Deterministic across processes.
    pub fn of(text: &str) -> Self {
        let mut hasher = XxHash64::with_seed(NAME_HASH_SEED);
        hasher.write(text.as_bytes());
        Self(hasher.finish())
    }

    /// Wraps a raw id read from a stream.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// An interned string together with its stable id.
///
/// Equality and hashing are by text: ids are derived from the text, so two
/// names with equal text always carry equal ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    text: String,
    id: NameId,
}

impl Name {
    /// Interns a string, deriving its stable id.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let id = NameId::of(&text);
        Self { text, id }
    }

    /// The string form.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The stable id.
    pub fn id(&self) -> NameId {
        self.id
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// The per-file deduplicated string table.
///
/// Loaded once per file and then merged into the session's [`NameRegistry`].
/// Insertion order is preserved so that writing a table back is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameTable {
    entries: IndexMap<String, NameId>,
}

impl NameTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string, returning its id. Re-adding an existing string is a no-op.
    pub fn add(&mut self, text: &str) -> NameId {
        if let Some(id) = self.entries.get(text) {
            return *id;
        }
        let id = NameId::of(text);
        self.entries.insert(text.to_string(), id);
        id
    }

    /// Inserts an entry decoded from a stream, validating the recorded id
    /// against the one derived from the text.
    pub fn insert_checked(&mut self, text: String, id: NameId) -> Result<()> {
        let expected = NameId::of(&text);
        if id != expected {
            return Err(FbomError::Format(format!(
                "Name table entry {text:?} carries id {} but hashes to {}",
                id.as_u64(),
                expected.as_u64()
            )));
        }
        self.entries.insert(text, id);
        Ok(())
    }

    /// Number of distinct strings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NameId)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Merges every entry into the process-wide registry. Additive only.
    pub fn register_all(&self, registry: &NameRegistry) {
        for (text, _) in &self.entries {
            registry.intern(text);
        }
    }
}

/// The process-wide name-interning registry.
///
/// Modeled as an explicit service rather than a hidden global: the session
/// configuration owns an `Arc<NameRegistry>` and hands it to every reader it
/// spawns. Interning is guarded by a mutex, which is all the synchronization
/// deserialization requires (single-threaded parsing, shared registry).
#[derive(Debug, Default)]
pub struct NameRegistry {
    entries: Mutex<IndexMap<String, NameId>>,
}

impl NameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its [`Name`].
    pub fn intern(&self, text: &str) -> Name {
        let name = Name::new(text);
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(text.to_string()).or_insert(name.id());
        }
        name
    }

    /// Looks up the id of an already-interned string.
    pub fn get(&self, text: &str) -> Option<NameId> {
        self.entries.lock().ok().and_then(|e| e.get(text).copied())
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_means_equal_id() {
        assert_eq!(Name::new("position").id(), Name::new("position").id());
        assert_ne!(Name::new("position").id(), Name::new("rotation").id());
    }

    #[test]
    fn table_deduplicates() {
        let mut table = NameTable::new();
        let a = table.add("mesh");
        let b = table.add("mesh");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_checked_rejects_forged_ids() {
        let mut table = NameTable::new();
        let err = table.insert_checked("mesh".into(), NameId::from_raw(0xBAD));
        assert!(err.is_err());
    }

    #[test]
    fn registry_only_grows() {
        let registry = NameRegistry::new();
        let mut table = NameTable::new();
        table.add("x");
        table.add("y");
        table.register_all(&registry);
        table.register_all(&registry);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("x"), Some(NameId::of("x")));
    }
}
