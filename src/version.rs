//! Format versioning and the compatibility gate applied in the stream header.

use std::fmt;

/// A format version packed into the 4-byte header field as
/// `(major << 16) | (minor << 8) | patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FbomVersion {
    /// Incompatible layout changes.
    pub major: u8,
    /// Backwards-compatible additions.
    pub minor: u8,
    /// Fixes with no layout impact.
    pub patch: u8,
}

/// The version written by this crate.
pub const CURRENT_VERSION: FbomVersion = FbomVersion::new(1, 0, 0);

impl FbomVersion {
    /// Creates a version triple.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Packs into the on-wire `u32`.
    pub const fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }

    /// Unpacks from the on-wire `u32`. The top byte is reserved and ignored.
    pub const fn from_u32(raw: u32) -> Self {
        Self {
            major: ((raw >> 16) & 0xFF) as u8,
            minor: ((raw >> 8) & 0xFF) as u8,
            patch: (raw & 0xFF) as u8,
        }
    }

    /// Compatibility predicate between a file's version and the running one.
    ///
    /// Returns `0` when compatible, a negative value when the file is older
    /// than supported and a positive value when it is newer. The reader treats
    /// this as opaque: any non-zero result aborts the read with a version
    /// error. Current policy: same major version.
    pub fn test_compatibility(file: FbomVersion, current: FbomVersion) -> i32 {
        i32::from(file.major) - i32::from(current.major)
    }
}

impl fmt::Display for FbomVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
