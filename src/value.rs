//! Typed data cells: the universal value unit of the format.
//!
//! An [`FbomData`] is a byte payload tagged with exactly one
//! [`FbomType`](crate::typed::FbomType). There is no separate content-kind tag;
//! the interpretation of the bytes is entirely determined by the type. Numeric
//! payloads are stored little-endian regardless of the container's declared
//! byte order, so a cell's bytes mean the same thing in every stream. String,
//! buffer and struct payloads are opaque byte runs copied verbatim.
//!
//! Equality is `(type, bytes, flags)` — precisely the key the static pool
//! deduplicates on. The writer guarantees that equal cells serialize to
//! byte-identical output.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::compression::{Compressor, CompressorRegistry};
use crate::error::{FbomError, Result};
use crate::format::FbomDataFlags;
use crate::names::Name;
use crate::object::FbomObject;
use crate::reader::FbomConfig;
use crate::typed::{native, FbomType, TypeSize};
use crate::{reader, writer};

/// The bincode configuration used for struct payloads.
///
/// Fixed-width little-endian integers: equal values must encode to identical
/// bytes, because the static pool keys deduplication on payload equality.
pub(crate) fn struct_codec() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

/// A fixed-layout type that can travel through an FBOM cell.
///
/// Implementors declare the descriptor used for the three-way
/// (name, size, native id) compatibility check on read.
pub trait FbomStruct: Serialize + DeserializeOwned {
    /// The descriptor recorded next to serialized values of this type.
    fn fbom_type() -> FbomType;
}

/// One decoded numeric representation, in the fixed coercion trial order.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

/// A byte payload tagged with exactly one type descriptor.
#[derive(Debug, Clone)]
pub struct FbomData {
    ty: FbomType,
    bytes: Vec<u8>,
    flags: FbomDataFlags,
    /// In-memory cache of an embedded object, carried alongside the bytes when
    /// the cell was built with `keep_native_handle`. Never serialized and
    /// never part of equality.
    cached: Option<Arc<FbomObject>>,
}

impl Default for FbomData {
    fn default() -> Self {
        Self::new(FbomType::unset(), Vec::new(), FbomDataFlags::empty())
    }
}

impl PartialEq for FbomData {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.bytes == other.bytes && self.flags == other.flags
    }
}

impl FbomData {
    /// Builds a cell from its parts.
    pub fn new(ty: FbomType, bytes: Vec<u8>, flags: FbomDataFlags) -> Self {
        Self {
            ty,
            bytes,
            flags,
            cached: None,
        }
    }

    /// The cell's type descriptor.
    pub fn ty(&self) -> &FbomType {
        &self.ty
    }

    /// The raw payload, including any compression framing.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The cell's flags.
    pub fn flags(&self) -> FbomDataFlags {
        self.flags
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The uncompressed payload. Typed reads go through this accessor, so a
    /// still-compressed cell fails loudly instead of decoding garbage.
    fn raw(&self) -> Result<&[u8]> {
        if self.flags.contains(FbomDataFlags::COMPRESSED) {
            return Err(FbomError::Compression(
                "Cell is compressed; decompress it before reading".into(),
            ));
        }
        Ok(&self.bytes)
    }

    // --- NUMERIC CELLS ---

    /// Decodes the payload as whichever numeric representation the recorded
    /// native id selects, trying the fixed order
    /// i8, u8, i16, u16, i32, u32, i64, u64, f32, f64.
    fn numeric(&self) -> Result<Numeric> {
        let bytes = self.raw()?;
        let native = self.ty.native.ok_or_else(|| {
            FbomError::Type(format!("{} carries no native id; not numeric", self.ty))
        })?;

        macro_rules! fixed {
            ($ty:ty, $variant:ident) => {{
                let arr: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().map_err(|_| {
                    FbomError::Stream(format!(
                        "{} cell holds {} bytes, expected {}",
                        self.ty,
                        self.bytes.len(),
                        std::mem::size_of::<$ty>()
                    ))
                })?;
                Ok(Numeric::$variant(<$ty>::from_le_bytes(arr)))
            }};
        }

        if native == native::I8 {
            fixed!(i8, I8)
        } else if native == native::U8 {
            fixed!(u8, U8)
        } else if native == native::I16 {
            fixed!(i16, I16)
        } else if native == native::U16 {
            fixed!(u16, U16)
        } else if native == native::I32 {
            fixed!(i32, I32)
        } else if native == native::U32 {
            fixed!(u32, U32)
        } else if native == native::I64 {
            fixed!(i64, I64)
        } else if native == native::U64 {
            fixed!(u64, U64)
        } else if native == native::F32 {
            fixed!(f32, F32)
        } else if native == native::F64 {
            fixed!(f64, F64)
        } else {
            Err(FbomError::Type(format!(
                "{} does not match any numeric representation",
                self.ty
            )))
        }
    }

    /// Encodes an already-little-endian numeric payload under a canonical type.
    fn from_numeric(ty: FbomType, payload: &[u8]) -> Self {
        Self::new(ty, payload.to_vec(), FbomDataFlags::empty())
    }

    // --- STRING / NAME / BUFFER CELLS ---

    /// Builds a string cell: the raw UTF-8 bytes with no terminator.
    pub fn from_string(value: &str) -> Self {
        Self::new(
            FbomType::string(),
            value.as_bytes().to_vec(),
            FbomDataFlags::empty(),
        )
    }

    /// Reads a string cell back.
    pub fn as_string(&self) -> Result<String> {
        if !self.ty.is_or_extends(&FbomType::string(), true, false)
            && !self.ty.is_or_extends(&FbomType::name(), true, false)
        {
            return Err(FbomError::Type(format!("{} is not a string type", self.ty)));
        }
        String::from_utf8(self.raw()?.to_vec())
            .map_err(|e| FbomError::Type(format!("Invalid UTF-8 in string cell: {e}")))
    }

    /// Builds a name cell from an interned name.
    pub fn from_name(name: &Name) -> Self {
        Self::new(
            FbomType::name(),
            name.as_str().as_bytes().to_vec(),
            FbomDataFlags::empty(),
        )
    }

    /// Interprets the cell as a name.
    pub fn as_name(&self) -> Result<Name> {
        if !self.ty.is_or_extends(&FbomType::name(), true, false) {
            return Err(FbomError::Type(format!("{} is not a name type", self.ty)));
        }
        let text = String::from_utf8(self.raw()?.to_vec())
            .map_err(|e| FbomError::Type(format!("Invalid UTF-8 in name cell: {e}")))?;
        Ok(Name::new(text))
    }

    /// Builds a raw byte-buffer cell.
    pub fn from_byte_buffer(bytes: &[u8]) -> Self {
        Self::new(
            FbomType::byte_buffer(),
            bytes.to_vec(),
            FbomDataFlags::empty(),
        )
    }

    /// Copies out the first `n` payload bytes.
    ///
    /// # Errors
    /// [`FbomError::Stream`] when `n` exceeds the payload length.
    pub fn read_bytes(&self, n: usize) -> Result<Vec<u8>> {
        let raw = self.raw()?;
        if n > raw.len() {
            return Err(FbomError::Stream(format!(
                "Read of {n} bytes out of bounds for a {}-byte cell",
                raw.len()
            )));
        }
        Ok(raw[..n].to_vec())
    }

    // --- STRUCT CELLS ---

    /// Serializes a fixed-layout value under its declared descriptor.
    pub fn from_struct<T: FbomStruct>(value: &T) -> Result<Self> {
        let ty = T::fbom_type();
        let bytes = bincode::serde::encode_to_vec(value, struct_codec())
            .map_err(|e| FbomError::Type(format!("Struct encode failed: {e}")))?;
        if let TypeSize::Fixed(size) = ty.size {
            if bytes.len() as u64 != size {
                return Err(FbomError::Type(format!(
                    "{} declares {} bytes but encoded to {}",
                    ty,
                    size,
                    bytes.len()
                )));
            }
        }
        Ok(Self::new(ty, bytes, FbomDataFlags::empty()))
    }

    /// Deserializes the payload as `T`, guarded by the defensive three-way
    /// (name, size, native id) check. The relaxation flags loosen the size and
    /// native-id comparisons for forward/backward compatibility.
    pub fn read_struct<T: FbomStruct>(
        &self,
        allow_unbounded: bool,
        allow_void_native_id: bool,
    ) -> Result<T> {
        let expected = T::fbom_type();
        if !self
            .ty
            .is_or_extends(&expected, allow_unbounded, allow_void_native_id)
        {
            return Err(FbomError::Type(format!(
                "Cell type {} does not match struct type {}",
                self.ty, expected
            )));
        }
        bincode::serde::decode_from_slice(self.raw()?, struct_codec())
            .map(|(value, _)| value)
            .map_err(|e| FbomError::Type(format!("Struct decode failed: {e}")))
    }

    // --- EMBEDDED OBJECT / ARRAY CELLS ---

    /// Embeds a complete object as a self-contained serialized payload.
    ///
    /// With `keep_native_handle` the materialized object (including any
    /// marshaled native handle) also travels with the cell in memory and
    /// [`FbomData::read_object`] returns it without re-decoding; without it,
    /// the next read re-materializes from bytes.
    pub fn from_object(node: FbomObject, keep_native_handle: bool) -> Result<Self> {
        let bytes = writer::serialize_object_payload(&node)?;
        let mut cell = Self::new(FbomType::object(), bytes, FbomDataFlags::empty());
        if keep_native_handle {
            cell.cached = Some(Arc::new(node));
        }
        Ok(cell)
    }

    /// Decodes the embedded object, preferring the in-memory cache.
    pub fn read_object(&self, config: &FbomConfig) -> Result<FbomObject> {
        if !self.ty.is_object() {
            return Err(FbomError::Type(format!("{} is not an object cell", self.ty)));
        }
        if let Some(cached) = &self.cached {
            return Ok(cached.as_ref().clone());
        }
        reader::deserialize_object_payload(self.raw()?, config)
    }

    /// Embeds an ordered array of cells as a self-contained payload.
    pub fn from_array(cells: &[FbomData]) -> Result<Self> {
        let bytes = writer::serialize_array_payload(cells)?;
        Ok(Self::new(FbomType::array(), bytes, FbomDataFlags::empty()))
    }

    /// Decodes the embedded array.
    pub fn read_array(&self, config: &FbomConfig) -> Result<Vec<FbomData>> {
        if !self.ty.is_array() {
            return Err(FbomError::Type(format!("{} is not an array cell", self.ty)));
        }
        reader::deserialize_array_payload(self.raw()?, config)
    }

    // --- COMPRESSION ---

    /// Returns a compressed copy of this cell, framed as
    /// `[u8 algorithm id][compressed payload]` with the `COMPRESSED` flag set.
    pub fn compress(&self, algo: &dyn Compressor) -> Result<Self> {
        let raw = self.raw()?;
        let compressed = algo.compress(raw)?;
        let mut bytes = Vec::with_capacity(compressed.len() + 1);
        bytes.push(algo.id());
        bytes.extend_from_slice(&compressed);
        Ok(Self::new(
            self.ty.clone(),
            bytes,
            self.flags | FbomDataFlags::COMPRESSED,
        ))
    }

    /// Resolves the algorithm id through the registry and returns the
    /// decompressed cell.
    pub fn decompress(&self, registry: &CompressorRegistry) -> Result<Self> {
        if !self.flags.contains(FbomDataFlags::COMPRESSED) {
            return Ok(self.clone());
        }
        let (id, payload) = self.bytes.split_first().ok_or_else(|| {
            FbomError::Compression("Compressed cell is missing its algorithm id".into())
        })?;
        let raw = registry.get(*id)?.decompress(payload)?;
        Ok(Self::new(
            self.ty.clone(),
            raw.into_owned(),
            self.flags - FbomDataFlags::COMPRESSED,
        ))
    }
}

macro_rules! numeric_cell {
    ($from:ident, $read:ident, $ty:ty, $canon:ident) => {
        impl FbomData {
            /// Builds a canonical numeric cell.
            pub fn $from(value: $ty) -> Self {
                Self::from_numeric(FbomType::$canon(), &value.to_le_bytes())
            }

            /// Reads the cell as this numeric type, coercing from any known
            /// numeric representation with a genuine value cast.
            pub fn $read(&self) -> Result<$ty> {
                Ok(match self.numeric()? {
                    Numeric::I8(v) => v as $ty,
                    Numeric::U8(v) => v as $ty,
                    Numeric::I16(v) => v as $ty,
                    Numeric::U16(v) => v as $ty,
                    Numeric::I32(v) => v as $ty,
                    Numeric::U32(v) => v as $ty,
                    Numeric::I64(v) => v as $ty,
                    Numeric::U64(v) => v as $ty,
                    Numeric::F32(v) => v as $ty,
                    Numeric::F64(v) => v as $ty,
                })
            }
        }
    };
}

numeric_cell!(from_i8, read_i8, i8, int8);
numeric_cell!(from_u8, read_u8, u8, uint8);
numeric_cell!(from_i16, read_i16, i16, int16);
numeric_cell!(from_u16, read_u16, u16, uint16);
numeric_cell!(from_i32, read_i32, i32, int32);
numeric_cell!(from_u32, read_u32, u32, uint32);
numeric_cell!(from_i64, read_i64, i64, int64);
numeric_cell!(from_u64, read_u64, u64, uint64);
numeric_cell!(from_f32, read_f32, f32, float32);
numeric_cell!(from_f64, read_f64, f64, float64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn numeric_coercion_widens() {
        let cell = FbomData::from_u32(123_456);
        assert_eq!(cell.read_i64().unwrap(), 123_456);
        assert_eq!(cell.read_f64().unwrap(), 123_456.0);
    }

    #[test]
    fn float_to_int_truncates() {
        let cell = FbomData::from_f32(3.75);
        assert_eq!(cell.read_i32().unwrap(), 3);
    }

    #[test]
    fn non_numeric_read_is_a_type_error() {
        let cell = FbomData::from_string("hello");
        assert!(matches!(cell.read_u32(), Err(FbomError::Type(_))));
    }

    #[test]
    fn strings_carry_no_terminator() {
        let cell = FbomData::from_string("abc");
        assert_eq!(cell.bytes(), b"abc");
        assert_eq!(cell.as_string().unwrap(), "abc");
    }

    #[test]
    fn read_bytes_is_bounds_checked() {
        let cell = FbomData::from_byte_buffer(&[1, 2, 3]);
        assert_eq!(cell.read_bytes(2).unwrap(), vec![1, 2]);
        assert!(matches!(cell.read_bytes(4), Err(FbomError::Stream(_))));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Vec3f {
        x: f32,
        y: f32,
        z: f32,
    }

    impl FbomStruct for Vec3f {
        fn fbom_type() -> FbomType {
            FbomType::structure("Vec3f", 12)
        }
    }

    #[test]
    fn struct_cells_round_trip() {
        let v = Vec3f {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        let cell = FbomData::from_struct(&v).unwrap();
        assert_eq!(cell.len(), 12);
        assert_eq!(cell.read_struct::<Vec3f>(false, false).unwrap(), v);
    }

    #[test]
    fn struct_read_enforces_the_three_way_check() {
        let cell = FbomData::from_string("not a vec3");
        assert!(cell.read_struct::<Vec3f>(false, false).is_err());
    }

    #[test]
    fn equal_cells_compare_equal_regardless_of_cache() {
        let a = FbomData::from_u32(7);
        let b = FbomData::from_u32(7);
        assert_eq!(a, b);
    }

    #[test]
    fn compression_round_trips_through_the_registry() {
        let registry = CompressorRegistry::new();
        let cell = FbomData::from_byte_buffer(&[9u8; 64]);
        let packed = cell.compress(&crate::compression::NoCompression).unwrap();
        assert!(packed.flags().contains(FbomDataFlags::COMPRESSED));
        assert!(packed.read_bytes(1).is_err());
        let unpacked = packed.decompress(&registry).unwrap();
        assert_eq!(unpacked, cell);
    }
}
