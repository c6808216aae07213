//! Endianness-normalized primitive access over byte slices.
//!
//! The container format is portable across endianness: every multi-byte
//! primitive belonging to the container (command counts, offsets, unique ids,
//! flag words, version) is decoded with the endianness declared in the stream
//! header. Opaque payload runs belonging to data cells (struct bytes, string
//! bytes, byte buffers) are copied verbatim and are NOT byte-swapped — this
//! asymmetry is part of the wire format and must not be "fixed".

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{FbomError, Result};
use crate::format::{ENDIANNESS_BIG, ENDIANNESS_LITTLE};

/// Byte order of a stream, declared once in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl Endianness {
    /// The byte order of the machine running this code.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// The header flag byte for this order.
    pub const fn flag_byte(self) -> u8 {
        match self {
            Self::Little => ENDIANNESS_LITTLE,
            Self::Big => ENDIANNESS_BIG,
        }
    }

    /// Decodes the header flag byte.
    pub fn from_flag(byte: u8) -> Result<Self> {
        match byte {
            ENDIANNESS_LITTLE => Ok(Self::Little),
            ENDIANNESS_BIG => Ok(Self::Big),
            other => Err(FbomError::Format(format!(
                "Unknown endianness flag: 0x{other:02x}"
            ))),
        }
    }
}

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:expr, $le:path, $be:path) => {
        /// Reads one container primitive, swapped to host order.
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size, stringify!($ty))?;
            Ok(match self.endianness {
                Endianness::Little => $le(bytes),
                Endianness::Big => $be(bytes),
            })
        }
    };
}

macro_rules! write_primitive {
    ($name:ident, $ty:ty, $size:expr, $le:path, $be:path) => {
        /// Appends one container primitive in the stream's byte order.
        pub fn $name(&mut self, value: $ty) {
            let mut buf = [0u8; $size];
            match self.endianness {
                Endianness::Little => $le(&mut buf, value),
                Endianness::Big => $be(&mut buf, value),
            }
            self.buf.extend_from_slice(&buf);
        }
    };
}

/// A positioned cursor over a byte slice carrying the session endianness.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endianness: Endianness,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `data`. The order defaults to little-endian until
    /// the header flag has been decoded.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            endianness: Endianness::Little,
        }
    }

    /// Switches the byte order after the header flag has been read.
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// The byte order currently in effect.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current cursor offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FbomError::Stream(format!(
                "Unexpected end of stream reading {what} at offset {}: need {n} bytes, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    /// Returns the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or_else(|| {
            FbomError::Stream(format!("Unexpected end of stream peeking at offset {}", self.pos))
        })
    }

    // The container format only ever carries unsigned primitives; signed and
    // float values travel inside opaque cell payloads.
    read_primitive!(read_u16, u16, 2, LittleEndian::read_u16, BigEndian::read_u16);
    read_primitive!(read_u32, u32, 4, LittleEndian::read_u32, BigEndian::read_u32);
    read_primitive!(read_u64, u64, 8, LittleEndian::read_u64, BigEndian::read_u64);

    /// Reads `n` opaque payload bytes verbatim (never swapped).
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n, "byte run")
    }
}

/// The symmetric append-only builder used by the writer.
#[derive(Debug)]
pub struct ByteWriter {
    buf: Vec<u8>,
    endianness: Endianness,
}

impl ByteWriter {
    /// Creates an empty writer emitting in the given byte order.
    pub fn new(endianness: Endianness) -> Self {
        Self {
            buf: Vec::new(),
            endianness,
        }
    }

    /// The byte order in effect.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    write_primitive!(write_u16, u16, 2, LittleEndian::write_u16, BigEndian::write_u16);
    write_primitive!(write_u32, u32, 4, LittleEndian::write_u32, BigEndian::write_u32);
    write_primitive!(write_u64, u64, 8, LittleEndian::write_u64, BigEndian::write_u64);

    /// Appends an opaque payload run verbatim (never swapped).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
