//! Tools for inspecting the structure of serialized streams.
//! Useful for debugging dedup behavior and verifying what a writer emitted.

use std::fmt;

use crate::error::Result;
use crate::format::PoolKind;
use crate::object::FbomObject;
use crate::pool::PoolValue;
use crate::reader::{parse_stream, FbomConfig};
use crate::stream::Endianness;

/// The stream inspector.
#[derive(Debug)]
pub struct FbomInspector;

/// A structural report of one serialized stream.
#[derive(Debug)]
pub struct DebugReport {
    /// Total stream size in bytes.
    pub stream_size: usize,
    /// Declared byte order.
    pub endianness: Endianness,
    /// Format version, rendered as `major.minor.patch`.
    pub version: String,
    /// One entry per static-pool slot, in offset order.
    pub pool: Vec<PoolSlotInfo>,
    /// The root object tree.
    pub tree: ObjectInfo,
}

/// Metadata for one static-pool slot.
#[derive(Debug)]
pub struct PoolSlotInfo {
    /// Slot offset.
    pub offset: u32,
    /// Kind tag, or `None` for an empty slot.
    pub kind: Option<PoolKind>,
    /// Short human-readable description of the slot value.
    pub detail: String,
}

/// Metadata for one object node.
#[derive(Debug)]
pub struct ObjectInfo {
    /// The node's type name.
    pub type_name: String,
    /// The node's unique id.
    pub unique_id: u64,
    /// `(name, type, payload length)` per property, in insertion order.
    pub properties: Vec<(String, String, usize)>,
    /// Child nodes, in stream order.
    pub children: Vec<ObjectInfo>,
}

impl FbomInspector {
    /// Parses a stream and returns its structural report.
    pub fn inspect(bytes: &[u8], config: &FbomConfig) -> Result<DebugReport> {
        let parsed = parse_stream(bytes, config)?;

        let pool = parsed
            .pool
            .iter()
            .map(|(offset, slot)| PoolSlotInfo {
                offset,
                kind: slot.map(PoolValue::kind),
                detail: match slot {
                    None => "empty".to_string(),
                    Some(PoolValue::Type(ty)) => ty.to_string(),
                    Some(PoolValue::Data(cell)) => {
                        format!("{} [{} bytes]", cell.ty(), cell.len())
                    }
                    Some(PoolValue::Object(node)) => {
                        format!("{} #{}", node.ty().name, node.unique_id())
                    }
                    Some(PoolValue::NameTable(table)) => {
                        format!("{} names", table.len())
                    }
                },
            })
            .collect();

        Ok(DebugReport {
            stream_size: bytes.len(),
            endianness: parsed.endianness,
            version: parsed.version.to_string(),
            pool,
            tree: Self::inspect_node(&parsed.root),
        })
    }

    fn inspect_node(node: &FbomObject) -> ObjectInfo {
        ObjectInfo {
            type_name: node.ty().name.clone(),
            unique_id: node.unique_id(),
            properties: node
                .properties()
                .map(|(name, cell)| (name.to_string(), cell.ty().to_string(), cell.len()))
                .collect(),
            children: node.children().iter().map(Self::inspect_node).collect(),
        }
    }
}

impl DebugReport {
    /// Number of populated pool slots of the given kind.
    pub fn pool_slots_of_kind(&self, kind: PoolKind) -> usize {
        self.pool.iter().filter(|s| s.kind == Some(kind)).count()
    }
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== FBOM INSPECTOR REPORT ===")?;
        writeln!(f, "Stream size: {} bytes", self.stream_size)?;
        writeln!(f, "Endianness:  {:?}", self.endianness)?;
        writeln!(f, "Version:     {}", self.version)?;

        if !self.pool.is_empty() {
            writeln!(f, "\n[STATIC DATA POOL]")?;
            for slot in &self.pool {
                writeln!(f, "  @{:<4} {}", slot.offset, slot.detail)?;
            }
        }

        writeln!(f, "\n[OBJECT TREE]")?;
        self.tree.fmt_recursive(f, "", true)
    }
}

impl ObjectInfo {
    fn fmt_recursive(&self, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };

        writeln!(
            f,
            "{}{}{} #{} ({} properties)",
            prefix,
            connector,
            self.type_name,
            self.unique_id,
            self.properties.len()
        )?;
        for (name, ty, len) in &self.properties {
            writeln!(f, "{}{}· {}: {} [{}b]", prefix, child_prefix, name, ty, len)?;
        }
        for (i, child) in self.children.iter().enumerate() {
            let last = i == self.children.len() - 1;
            child.fmt_recursive(f, &format!("{prefix}{child_prefix}"), last)?;
        }
        Ok(())
    }
}
