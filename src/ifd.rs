//! Layout constants for Classic and BigTIFF image file directories.

use num_enum::TryFromPrimitive;

use crate::error::{AsyncCogError, AsyncCogResult};

/// Container flavor, taken from the header version word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum TiffVersion {
    Classic = 42,
    Big = 43,
}

impl TiffVersion {
    pub(crate) fn parse(word: u16) -> AsyncCogResult<Self> {
        Self::try_from(word).map_err(|_| AsyncCogError::UnsupportedVersion(word))
    }

    /// Field widths for this flavor; fixed once the header is parsed.
    pub fn config(self) -> IfdConfig {
        match self {
            TiffVersion::Classic => IfdConfig::CLASSIC,
            TiffVersion::Big => IfdConfig::BIGTIFF,
        }
    }
}

/// Byte widths of the size-dependent IFD fields.
///
/// `tag_count_bytes` is the width of the entry-count word that opens an IFD,
/// `entry_bytes` the size of one tag record, and `pointer_bytes` the width
/// of file pointers (next-IFD links, value offsets). Within a tag record
/// both the count field and the value slot are `pointer_bytes` wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfdConfig {
    pub tag_count_bytes: u8,
    pub entry_bytes: u8,
    pub pointer_bytes: u8,
}

impl IfdConfig {
    pub const CLASSIC: IfdConfig = IfdConfig {
        tag_count_bytes: 2,
        entry_bytes: 12,
        pointer_bytes: 4,
    };

    pub const BIGTIFF: IfdConfig = IfdConfig {
        tag_count_bytes: 8,
        entry_bytes: 20,
        pointer_bytes: 8,
    };

    /// Offset of the value slot within a tag record: id (2) + type (2) +
    /// count (`pointer_bytes`).
    pub(crate) fn value_slot(&self) -> u64 {
        4 + self.pointer_bytes as u64
    }
}
