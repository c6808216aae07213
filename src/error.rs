//! Centralized error handling for the FBOM format.
//!
//! Every fallible operation in this crate returns [`Result`]. The first error
//! short-circuits all the way back to the top-level `deserialize` call with no
//! partial result — the single exception is an external-reference load failure
//! when the session opts into `continue_on_external_load_error`, which is the
//! one place a degraded result is accepted by design.
//!
//! ## Error Categories
//!
//! - **Stream** ([`FbomError::Stream`]): truncated input, unexpected end of stream
//! - **Format** ([`FbomError::Format`]): bad magic, unknown command or kind tag,
//!   out-of-bounds static offset, wrong root-object count
//! - **Version** ([`FbomError::Version`]): incompatible binary version
//! - **Type** ([`FbomError::Type`]): type mismatch on a typed read
//! - **Reference** ([`FbomError::Reference`]): an external file failed to load
//! - **Invariant** ([`FbomError::Invariant`]): stream-integrity assumptions were
//!   violated (e.g. a static slot dereferenced before it was populated); these
//!   indicate a malformed or out-of-order stream and are unrecoverable for that read
//! - **Io** / **Compression**: ambient failures from the file system or a
//!   pluggable compression backend

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for FBOM operations.
pub type Result<T> = std::result::Result<T, FbomError>;

/// The master error enum covering all failure domains in FBOM.
///
/// This type is `Clone` so that errors can be stored in the external-reference
/// cache or shared across readers without losing the original failure. I/O
/// errors are wrapped in `Arc` to make cloning cheap.
#[derive(Debug, Clone)]
pub enum FbomError {
    /// The stream ended before a read could complete.
    ///
    /// Carries what was being read and how many bytes were missing versus
    /// available, which is usually enough to locate a truncation.
    Stream(String),

    /// The stream does not conform to the FBOM layout.
    ///
    /// Wrong magic bytes, an unrecognized command opcode or pool kind tag, a
    /// static-pool offset past the declared slot count, or a top level with
    /// zero or more than one root object.
    Format(String),

    /// The stream was written by an incompatible format version.
    Version(String),

    /// A typed read did not match the cell's recorded type.
    ///
    /// Raised when no numeric representation matches the recorded native id,
    /// when a struct read fails the (name, size, native id) check, or when a
    /// string header carries the wrong kind tag.
    Type(String),

    /// An externally referenced file could not be loaded.
    ///
    /// This is the only recoverable category: under
    /// `continue_on_external_load_error` the reader records the failure and
    /// keeps going with a placeholder object.
    Reference(String),

    /// A stream-integrity invariant was violated.
    ///
    /// Distinct from [`FbomError::Format`]: a `Format` error means the bytes
    /// are wrong, an `Invariant` error means the bytes arrived in an order the
    /// format forbids (a static slot referenced before the static-data block
    /// populated it, a slot written twice, and so on).
    Invariant(String),

    /// Low-level I/O failure while opening or mapping a file.
    Io(Arc<io::Error>),

    /// A compressed payload could not be decompressed, or the compression
    /// algorithm id is not registered.
    Compression(String),
}

impl fmt::Display for FbomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(s) => write!(f, "Stream Error: {s}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::Version(s) => write!(f, "Version Error: {s}"),
            Self::Type(s) => write!(f, "Type Error: {s}"),
            Self::Reference(s) => write!(f, "Reference Error: {s}"),
            Self::Invariant(s) => write!(f, "Invariant Violation: {s}"),
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
        }
    }
}

impl std::error::Error for FbomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for FbomError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_category_and_message() {
        let err = FbomError::Format("bad magic".into());
        assert_eq!(err.to_string(), "Format Error: bad magic");

        let err = FbomError::Invariant("slot 3 not populated".into());
        assert!(err.to_string().starts_with("Invariant Violation"));
    }

    #[test]
    fn io_errors_are_cloneable_and_expose_source() {
        use std::error::Error;
        let err: FbomError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        let clone = err.clone();
        assert!(clone.source().is_some());
    }
}
