//! Type descriptors: the small algebra describing every value shape in an
//! FBOM stream.
//!
//! A descriptor is created once per distinct shape and never mutated; parent
//! chains are therefore finite and acyclic by construction. Many objects and
//! data cells share the same logical descriptor, which makes descriptors prime
//! candidates for static-pool deduplication.

use std::fmt;
use std::sync::Arc;

/// Declared byte size of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSize {
    /// The payload is exactly this many bytes.
    Fixed(u64),
    /// The payload length is not fixed by the type (strings, buffers,
    /// embedded objects and arrays).
    Unbounded,
}

impl TypeSize {
    /// Sentinel used on the wire for [`TypeSize::Unbounded`].
    pub const UNBOUNDED_WIRE: u64 = u64::MAX;

    /// The on-wire representation.
    pub fn to_wire(self) -> u64 {
        match self {
            Self::Fixed(n) => n,
            Self::Unbounded => Self::UNBOUNDED_WIRE,
        }
    }

    /// Decodes the on-wire representation.
    pub fn from_wire(raw: u64) -> Self {
        if raw == Self::UNBOUNDED_WIRE {
            Self::Unbounded
        } else {
            Self::Fixed(raw)
        }
    }
}

/// A stable opaque identifier for a type with native meaning to the host
/// program. Canonical shapes get fixed ids; user struct types usually carry
/// none and rely on name/size matching instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTypeId(u64);

impl NativeTypeId {
    /// Wraps a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NativeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeTypeId({})", self.0)
    }
}

/// Stable native ids for the canonical shapes.
pub mod native {
    use super::NativeTypeId;

    /// Unset / void.
    pub const VOID: NativeTypeId = NativeTypeId::new(0);
    /// `i8`
    pub const I8: NativeTypeId = NativeTypeId::new(1);
    /// `u8`
    pub const U8: NativeTypeId = NativeTypeId::new(2);
    /// `i16`
    pub const I16: NativeTypeId = NativeTypeId::new(3);
    /// `u16`
    pub const U16: NativeTypeId = NativeTypeId::new(4);
    /// `i32`
    pub const I32: NativeTypeId = NativeTypeId::new(5);
    /// `u32`
    pub const U32: NativeTypeId = NativeTypeId::new(6);
    /// `i64`
    pub const I64: NativeTypeId = NativeTypeId::new(7);
    /// `u64`
    pub const U64: NativeTypeId = NativeTypeId::new(8);
    /// `f32`
    pub const F32: NativeTypeId = NativeTypeId::new(9);
    /// `f64`
    pub const F64: NativeTypeId = NativeTypeId::new(10);
    /// UTF-8 string.
    pub const STRING: NativeTypeId = NativeTypeId::new(11);
    /// Raw byte buffer.
    pub const BYTE_BUFFER: NativeTypeId = NativeTypeId::new(12);
    /// Interned name.
    pub const NAME: NativeTypeId = NativeTypeId::new(13);
    /// Embedded serialized object.
    pub const OBJECT: NativeTypeId = NativeTypeId::new(14);
    /// Embedded serialized array of data cells.
    pub const ARRAY: NativeTypeId = NativeTypeId::new(15);
}

/// A value describing a concrete or abstract data shape.
///
/// Immutable after construction. Single inheritance: a descriptor optionally
/// extends one parent, and `is_or_extends` walks that chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FbomType {
    /// The type's stable name.
    pub name: String,
    /// Declared payload size.
    pub size: TypeSize,
    /// Optional native identity for host-known shapes.
    pub native: Option<NativeTypeId>,
    /// Optional parent in the single-inheritance chain.
    pub parent: Option<Arc<FbomType>>,
}

impl FbomType {
    /// Creates a root descriptor with no parent.
    pub fn new(name: impl Into<String>, size: TypeSize, native: Option<NativeTypeId>) -> Self {
        Self {
            name: name.into(),
            size,
            native,
            parent: None,
        }
    }

    /// Returns a new descriptor whose parent is `self`.
    pub fn extend(&self, mut child: FbomType) -> FbomType {
        child.parent = Some(Arc::new(self.clone()));
        child
    }

    /// Compares this descriptor with `other` without walking parents.
    ///
    /// `allow_unbounded` relaxes the size comparison when either side is
    /// unbounded, for readers without compile-time knowledge of the writer's
    /// exact type.
    pub fn is_type(&self, other: &FbomType, allow_unbounded: bool) -> bool {
        if self.name != other.name {
            return false;
        }
        let size_ok = match (self.size, other.size) {
            (a, b) if a == b => true,
            (TypeSize::Unbounded, _) | (_, TypeSize::Unbounded) => allow_unbounded,
            _ => false,
        };
        size_ok && self.native == other.native
    }

    /// Walks the parent chain testing whether this type is `other` or extends it.
    ///
    /// `allow_void_native_id` additionally accepts a match where one side has
    /// no native id (or the void id), used for forward/backward compatibility
    /// with writers that did not record native identity.
    pub fn is_or_extends(
        &self,
        other: &FbomType,
        allow_unbounded: bool,
        allow_void_native_id: bool,
    ) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.is_type(other, allow_unbounded)
                || (allow_void_native_id
                    && ty.name == other.name
                    && (Self::native_is_void(ty) || Self::native_is_void(other)))
            {
                return true;
            }
            current = ty.parent.as_deref();
        }
        false
    }

    fn native_is_void(ty: &FbomType) -> bool {
        match ty.native {
            None => true,
            Some(id) => id == native::VOID,
        }
    }

    /// True for the embedded-object container type.
    pub fn is_object(&self) -> bool {
        self.native == Some(native::OBJECT)
    }

    /// True for the embedded-array container type.
    pub fn is_array(&self) -> bool {
        self.native == Some(native::ARRAY)
    }

    // --- CANONICAL SHAPES ---

    /// The unset/void type.
    pub fn unset() -> Self {
        Self::new("UNSET", TypeSize::Fixed(0), Some(native::VOID))
    }

    /// Canonical `i8`.
    pub fn int8() -> Self {
        Self::new("i8", TypeSize::Fixed(1), Some(native::I8))
    }

    /// Canonical `u8`.
    pub fn uint8() -> Self {
        Self::new("u8", TypeSize::Fixed(1), Some(native::U8))
    }

    /// Canonical `i16`.
    pub fn int16() -> Self {
        Self::new("i16", TypeSize::Fixed(2), Some(native::I16))
    }

    /// Canonical `u16`.
    pub fn uint16() -> Self {
        Self::new("u16", TypeSize::Fixed(2), Some(native::U16))
    }

    /// Canonical `i32`.
    pub fn int32() -> Self {
        Self::new("i32", TypeSize::Fixed(4), Some(native::I32))
    }

    /// Canonical `u32`.
    pub fn uint32() -> Self {
        Self::new("u32", TypeSize::Fixed(4), Some(native::U32))
    }

    /// Canonical `i64`.
    pub fn int64() -> Self {
        Self::new("i64", TypeSize::Fixed(8), Some(native::I64))
    }

    /// Canonical `u64`.
    pub fn uint64() -> Self {
        Self::new("u64", TypeSize::Fixed(8), Some(native::U64))
    }

    /// Canonical `f32`.
    pub fn float32() -> Self {
        Self::new("f32", TypeSize::Fixed(4), Some(native::F32))
    }

    /// Canonical `f64`.
    pub fn float64() -> Self {
        Self::new("f64", TypeSize::Fixed(8), Some(native::F64))
    }

    /// Canonical UTF-8 string.
    pub fn string() -> Self {
        Self::new("String", TypeSize::Unbounded, Some(native::STRING))
    }

    /// Canonical raw byte buffer.
    pub fn byte_buffer() -> Self {
        Self::new("ByteBuffer", TypeSize::Unbounded, Some(native::BYTE_BUFFER))
    }

    /// Canonical interned name.
    pub fn name() -> Self {
        Self::new("Name", TypeSize::Unbounded, Some(native::NAME))
    }

    /// Container type for a cell embedding a serialized object.
    pub fn object() -> Self {
        Self::new("Object", TypeSize::Unbounded, Some(native::OBJECT))
    }

    /// Container type for a cell embedding a serialized array.
    pub fn array() -> Self {
        Self::new("Array", TypeSize::Unbounded, Some(native::ARRAY))
    }

    /// A user struct type with fixed layout and no native identity.
    pub fn structure(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, TypeSize::Fixed(size), None)
    }
}

impl fmt::Display for FbomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            TypeSize::Fixed(n) => write!(f, "{}({}b)", self.name, n),
            TypeSize::Unbounded => write!(f, "{}(*)", self.name),
        }
    }
}
