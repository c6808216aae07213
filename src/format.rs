//! Defines the physical layout of FBOM streams.
//!
//! # Stream Layout
//!
//! ```text
//! [Magic "FBOM"] [1-byte endianness flag] [4-byte version]
//! [command] [payload] [command] [payload] ...
//! ```
//!
//! Commands are single bytes that drive the reader state machine. Every
//! Type/Data/Object/NameTable payload is preceded by a one-byte data-location
//! selector telling the reader whether the value follows in place, lives in
//! the static data pool, or (objects only) resides in another file.
//!
//! ## Static-data block
//!
//! `[StaticDataStart] [u32 count] [8 bytes reserved]` followed by exactly
//! `count` entries of `[u32 offset] [u8 kind] [payload]`, then `[StaticDataEnd]`.
//!
//! ## Strings
//!
//! `[u32 header]` packing `(length << 8) | kind`, followed by `length` raw
//! bytes. No terminator is persisted.

use bitflags::bitflags;

use crate::error::{FbomError, Result};

/// Magic bytes identifying the format.
pub const MAGIC_BYTES: [u8; 4] = *b"FBOM";

/// Endianness flag value for little-endian streams.
pub const ENDIANNESS_LITTLE: u8 = 0x00;
/// Endianness flag value for big-endian streams.
pub const ENDIANNESS_BIG: u8 = 0x01;

/// Size of the fixed header: Magic(4) + Endianness(1) + Version(4).
pub const HEADER_SIZE: usize = 9;

/// Reserved trailer after the static-data slot count. Currently always zero.
pub const STATIC_DATA_RESERVED: usize = 8;

/// A command opcode driving the reader state machine.
///
/// Numeric values are part of the wire format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FbomCommand {
    /// No-op / unset.
    None = 0x00,
    /// Begins an object; followed by the object payload.
    ObjectStart = 0x01,
    /// Closes the innermost open object.
    ObjectEnd = 0x02,
    /// Begins the static-data block.
    StaticDataStart = 0x03,
    /// Closes the static-data block.
    StaticDataEnd = 0x04,
    /// Declares one named property of the innermost open object.
    DefineProperty = 0x05,
}

impl FbomCommand {
    /// Decodes a command byte, rejecting anything outside the known set.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::ObjectStart),
            0x02 => Ok(Self::ObjectEnd),
            0x03 => Ok(Self::StaticDataStart),
            0x04 => Ok(Self::StaticDataEnd),
            0x05 => Ok(Self::DefineProperty),
            other => Err(FbomError::Format(format!(
                "Unknown command opcode: 0x{other:02x}"
            ))),
        }
    }

    /// Returns the wire byte for this command.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Where the payload of a Type/Data/Object/NameTable value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataLocation {
    /// Unset. Never valid in a well-formed stream.
    None = 0x00,
    /// The value follows inline.
    InPlace = 0x01,
    /// The value is a `u32` offset into the static data pool.
    Static = 0x02,
    /// The value lives in another file (objects only).
    ExtRef = 0x03,
}

impl DataLocation {
    /// Decodes a location byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::InPlace),
            0x02 => Ok(Self::Static),
            0x03 => Ok(Self::ExtRef),
            other => Err(FbomError::Format(format!(
                "Unknown data location: 0x{other:02x}"
            ))),
        }
    }

    /// Returns the wire byte for this location.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Kind tag of a static-data pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolKind {
    /// Empty slot.
    None = 0x00,
    /// A [`crate::typed::FbomType`].
    Type = 0x01,
    /// An [`crate::value::FbomData`] cell.
    Data = 0x02,
    /// A complete [`crate::object::FbomObject`].
    Object = 0x03,
    /// A [`crate::names::NameTable`].
    NameTable = 0x04,
}

impl PoolKind {
    /// Decodes a pool kind byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Type),
            0x02 => Ok(Self::Data),
            0x03 => Ok(Self::Object),
            0x04 => Ok(Self::NameTable),
            other => Err(FbomError::Format(format!(
                "Unknown static-data kind: 0x{other:02x}"
            ))),
        }
    }

    /// Returns the wire byte for this kind.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Kind tag carried in the low byte of a string header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StringKind {
    /// UTF-8 text.
    Utf8 = 0x01,
    /// A raw byte run with no text semantics.
    Raw = 0x02,
}

impl StringKind {
    /// Decodes a string kind, rejecting unknown tags with a type error.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::Utf8),
            0x02 => Ok(Self::Raw),
            other => Err(FbomError::Type(format!(
                "Unknown string kind: 0x{other:02x}"
            ))),
        }
    }
}

/// Packs a string length and kind into the 4-byte string header.
///
/// Lengths are limited to 24 bits; longer strings are a format error on the
/// write side rather than a silent truncation.
pub fn pack_string_header(len: usize, kind: StringKind) -> Result<u32> {
    if len > 0x00FF_FFFF {
        return Err(FbomError::Format(format!(
            "String of {len} bytes exceeds the 24-bit header limit"
        )));
    }
    Ok(((len as u32) << 8) | kind as u32)
}

/// Splits a 4-byte string header into `(length, kind)`.
pub fn unpack_string_header(header: u32) -> Result<(usize, StringKind)> {
    let kind = StringKind::from_u8((header & 0xFF) as u8)?;
    Ok(((header >> 8) as usize, kind))
}

bitflags! {
    /// Per-cell flags stored alongside an [`crate::value::FbomData`] payload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FbomDataFlags: u32 {
        /// The payload bytes are compressed; decompression is delegated to the
        /// session's [`crate::compression::CompressorRegistry`].
        const COMPRESSED = 1 << 0;
        /// The cell stands in for an external reference that failed to load
        /// under `continue_on_external_load_error`.
        const EXT_REF_PLACEHOLDER = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_round_trip() {
        for cmd in [
            FbomCommand::None,
            FbomCommand::ObjectStart,
            FbomCommand::ObjectEnd,
            FbomCommand::StaticDataStart,
            FbomCommand::StaticDataEnd,
            FbomCommand::DefineProperty,
        ] {
            assert_eq!(FbomCommand::from_u8(cmd.as_u8()).unwrap(), cmd);
        }
        assert!(FbomCommand::from_u8(0x7F).is_err());
    }

    #[test]
    fn unknown_location_and_kind_are_format_errors() {
        assert!(matches!(
            DataLocation::from_u8(0x09),
            Err(FbomError::Format(_))
        ));
        assert!(matches!(PoolKind::from_u8(0xFF), Err(FbomError::Format(_))));
    }

    #[test]
    fn string_header_packs_length_and_kind() {
        let header = pack_string_header(300, StringKind::Utf8).unwrap();
        let (len, kind) = unpack_string_header(header).unwrap();
        assert_eq!(len, 300);
        assert_eq!(kind, StringKind::Utf8);
    }

    #[test]
    fn oversized_string_is_rejected() {
        assert!(pack_string_header(0x0100_0000, StringKind::Utf8).is_err());
    }
}
