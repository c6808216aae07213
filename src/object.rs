//! The object-graph model and the marshaler seam.
//!
//! An [`FbomObject`] is a graph node: a type descriptor, a 64-bit unique id,
//! named property cells (keys unique, insertion order preserved for
//! deterministic writes but irrelevant to equality), and an ordered list of
//! children whose order is load-bearing. A node may additionally carry a
//! materialized native handle, produced at most once by a registered marshaler
//! immediately after the node's closing marker is read.
//!
//! The core never depends on concrete native types: the marshaler seam is a
//! name-keyed registry of trait objects exposing exactly one conversion call.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::names::Name;
use crate::typed::FbomType;
use crate::value::FbomData;

/// An opaque handle to a materialized native value.
pub type NativeHandle = Arc<dyn Any + Send + Sync>;

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Converts a generic object node into a concrete native value.
///
/// Registered per type name in a [`MarshalerRegistry`]. Absence of a marshaler
/// is not an error; the node simply stays a plain data tree.
pub trait FbomMarshaler: Send + Sync {
    /// Materializes the node into a native handle.
    fn deserialize(&self, object: &FbomObject) -> Result<NativeHandle>;
}

/// Maps type names to marshalers.
#[derive(Default)]
pub struct MarshalerRegistry {
    loaders: HashMap<String, Box<dyn FbomMarshaler>>,
}

impl MarshalerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a marshaler for a type name, replacing any previous one.
    pub fn register(&mut self, type_name: impl Into<String>, loader: Box<dyn FbomMarshaler>) {
        self.loaders.insert(type_name.into(), loader);
    }

    /// Looks up the marshaler for a type name.
    pub fn get_loader(&self, type_name: &str) -> Option<&dyn FbomMarshaler> {
        self.loaders.get(type_name).map(Box::as_ref)
    }
}

impl std::fmt::Debug for MarshalerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarshalerRegistry")
            .field("types", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A pointer from one file to an object in another file.
///
/// `index` selects an object within multi-object library files; only `0` (the
/// root object) is currently meaningful. `flags` is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    /// File name, resolved against the session's base path.
    pub file: String,
    /// Object index within the referenced file.
    pub index: u32,
    /// Reserved flags word.
    pub flags: u32,
}

/// A node in the object graph.
#[derive(Clone)]
pub struct FbomObject {
    ty: FbomType,
    unique_id: u64,
    properties: IndexMap<Name, FbomData>,
    children: Vec<FbomObject>,
    deserialized: Option<NativeHandle>,
    external: Option<ExternalRef>,
}

impl FbomObject {
    /// Creates an empty node of the given type with a fresh unique id.
    pub fn new(ty: FbomType) -> Self {
        Self::with_unique_id(ty, NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a node with an explicit unique id (ids decoded from a stream).
    pub fn with_unique_id(ty: FbomType, unique_id: u64) -> Self {
        Self {
            ty,
            unique_id,
            properties: IndexMap::new(),
            children: Vec::new(),
            deserialized: None,
            external: None,
        }
    }

    /// Creates a node standing for an object in another file. The writer
    /// emits it as an external reference; the reader replaces it with the
    /// referenced file's root object.
    pub fn external(file: impl Into<String>, index: u32, flags: u32) -> Self {
        let mut node = Self::new(FbomType::unset());
        node.external = Some(ExternalRef {
            file: file.into(),
            index,
            flags,
        });
        node
    }

    /// The external reference this node stands for, if any.
    pub fn external_ref(&self) -> Option<&ExternalRef> {
        self.external.as_ref()
    }

    /// Marks this node as standing for an external reference (used for the
    /// placeholder kept after a tolerated load failure).
    pub(crate) fn set_external(&mut self, ext: ExternalRef) {
        self.external = Some(ext);
    }

    /// The node's type descriptor.
    pub fn ty(&self) -> &FbomType {
        &self.ty
    }

    /// The identity value carried per object, used as part of
    /// external-reference cache keys.
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    /// Inserts or overwrites a named property.
    pub fn set_property(&mut self, name: Name, cell: FbomData) {
        self.properties.insert(name, cell);
    }

    /// Looks a property up by name.
    pub fn get_property(&self, name: &str) -> Option<&FbomData> {
        self.properties.get(&Name::new(name))
    }

    /// All properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&Name, &FbomData)> {
        self.properties.iter()
    }

    /// Number of properties.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Appends a child. Child order is load-bearing and preserved exactly.
    pub fn add_child(&mut self, child: FbomObject) {
        self.children.push(child);
    }

    /// The ordered children.
    pub fn children(&self) -> &[FbomObject] {
        &self.children
    }

    /// Mutable access to the ordered children.
    pub fn children_mut(&mut self) -> &mut Vec<FbomObject> {
        &mut self.children
    }

    /// The materialized native handle, if a marshaler has run.
    pub fn deserialized(&self) -> Option<&NativeHandle> {
        self.deserialized.as_ref()
    }

    /// Stores the marshaler result. Populated at most once, by the reader's
    /// completion hook.
    pub fn set_deserialized(&mut self, handle: NativeHandle) {
        self.deserialized = Some(handle);
    }

    /// Discards the materialized handle, forcing re-materialization on the
    /// next explicit conversion.
    pub fn clear_deserialized(&mut self) {
        self.deserialized = None;
    }
}

impl std::fmt::Debug for FbomObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FbomObject")
            .field("ty", &self.ty)
            .field("unique_id", &self.unique_id)
            .field("properties", &self.properties)
            .field("children", &self.children)
            .field("deserialized", &self.deserialized.is_some())
            .field("external", &self.external)
            .finish()
    }
}

// Structural equality: type, id, properties (order-insensitive) and ordered
// children. The native handle is runtime state and never part of equality.
impl PartialEq for FbomObject {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
            && self.unique_id == other.unique_id
            && self.properties == other.properties
            && self.children == other.children
            && self.external == other.external
    }
}
