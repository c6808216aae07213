//! # FBOM
//!
//! A self-describing, versioned, deduplicating binary object format for
//! persisting and streaming object graphs (geometry, assets, scenes) to and
//! from byte streams.
//!
//! ## Overview
//!
//! FBOM is a miniature binary linker/deserializer rather than a conventional
//! serialization library. A stream carries its own type descriptions, a
//! graph-shaped object model with named properties and ordered children, an
//! offset-addressed value-deduplication table (the "static data pool"),
//! endianness normalization for the container format, and lazy, cached
//! cross-file reference resolution.
//!
//! ### Key Pieces
//!
//! *   **Type descriptors** ([`FbomType`]): small immutable values describing
//!     every data shape, forming single-inheritance chains.
//! *   **Data cells** ([`FbomData`]): byte payloads tagged with exactly one
//!     type — numbers, strings, buffers, structs, or whole embedded
//!     objects/arrays. Equality is `(type, bytes)`, which is exactly what the
//!     static pool deduplicates on.
//! *   **Object nodes** ([`FbomObject`]): typed graph nodes with a 64-bit
//!     unique id, named property cells, and ordered children.
//! *   **Static data pool**: a sparse, write-once slot arena addressed by
//!     integer offset; values referenced from several places are stored once
//!     and referenced by offset everywhere else.
//! *   **Reader / Writer** ([`FbomReader`], [`FbomWriter`]): the command-driven
//!     state machine decoding streams into graphs, and the symmetric two-pass
//!     encoder (dedup census, then emit).
//! *   **Marshalers** ([`FbomMarshaler`]): a name-keyed registry converting
//!     generic object nodes into concrete native handles; the core only ever
//!     sees the trait object.
//!
//! ## Usage
//!
//! ```rust
//! use fbom::{Fbom, FbomData, FbomObject, FbomType, Name};
//!
//! let mut root = FbomObject::new(FbomType::structure("Vec3f", 12));
//! root.set_property(Name::new("x"), FbomData::from_f32(1.0));
//! root.set_property(Name::new("y"), FbomData::from_f32(2.0));
//! root.set_property(Name::new("z"), FbomData::from_f32(3.0));
//!
//! let bytes = Fbom::serialize(&root)?;
//! let decoded = Fbom::deserialize(&bytes)?;
//! assert_eq!(decoded.get_property("y").unwrap().read_f32()?, 2.0);
//! # Ok::<(), fbom::FbomError>(())
//! ```
//!
//! ## Endianness
//!
//! The container format is portable: every multi-byte container primitive
//! (commands, counts, offsets, unique ids, flag words) is decoded with the
//! byte order declared in the header. Opaque cell payloads — struct bytes,
//! string bytes, byte buffers — are copied verbatim and never byte-swapped.
//! This asymmetry is deliberate wire compatibility, not an omission.
//!
//! ## Safety and Error Handling
//!
//! * `unsafe` appears once, for memory-mapping input files in the reader.
//! * No `unwrap()` or `panic!()` in library code (enforced by clippy lints).
//! * Every failure is a typed [`FbomError`]; the first error unwinds the
//!   whole read, except tolerated external-reference failures.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod api;
pub mod compression;
pub mod error;
pub mod format;
pub mod inspector;
pub mod names;
pub mod object;
pub mod pool;
pub mod reader;
pub mod stream;
pub mod typed;
pub mod value;
pub mod version;
pub mod writer;

pub use api::Fbom;
pub use compression::{Compressor, CompressorRegistry, NoCompression};
#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use error::{FbomError, Result};
pub use format::{DataLocation, FbomCommand, FbomDataFlags, PoolKind};
pub use inspector::{DebugReport, FbomInspector};
pub use names::{Name, NameId, NameRegistry, NameTable};
pub use object::{ExternalRef, FbomMarshaler, FbomObject, MarshalerRegistry, NativeHandle};
pub use pool::{PoolValue, StaticDataPool};
pub use reader::{FbomConfig, FbomReader};
pub use stream::{ByteReader, ByteWriter, Endianness};
pub use typed::{FbomType, NativeTypeId, TypeSize};
pub use value::{FbomData, FbomStruct};
pub use version::{FbomVersion, CURRENT_VERSION};
pub use writer::FbomWriter;
