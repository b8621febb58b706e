//! Error and result types used across the crate.

use thiserror::Error;

use crate::tags::TagId;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AsyncCogError {
    /// The file is big-endian; only little-endian TIFFs are supported.
    #[error("big-endian TIFF files are not supported")]
    UnsupportedEndian,

    /// The version word is neither 42 (TIFF) nor 43 (BigTIFF).
    #[error("unrecognized TIFF version word {0}")]
    UnsupportedVersion(u16),

    /// A BigTIFF header with an offset size other than 8 or a non-zero
    /// reserved word.
    #[error("unsupported BigTIFF offset layout (got {0})")]
    UnsupportedPointerSize(u16),

    /// An IFD extends past the loaded byte range and cannot be refetched.
    #[error("IFD at offset {0} extends past the loaded byte range")]
    IfdTruncated(u64),

    /// A tag carries a data type code outside the TIFF/BigTIFF registry.
    #[error("unknown tag data type code {0}")]
    UnknownDataType(u16),

    /// The source returned fewer bytes than requested.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    /// A tile or strip index outside the image.
    #[error("index {index} is out of bounds (limit {limit})")]
    IndexOutOfBounds { index: u64, limit: u64 },

    /// Origin or resolution requested from an image without any of
    /// ModelTiePoint, ModelTransformation or ModelPixelScale.
    #[error("image carries no geo transform")]
    NoGeoTransform,

    /// A geo key was looked up before the GeoKeyDirectory was unpacked.
    #[error("geo keys have not been loaded")]
    GeoNotLoaded,

    /// The GeoKeyDirectory layout or its referenced tags are inconsistent.
    #[error("malformed GeoKeyDirectory: {0}")]
    GeoKeyMalformed(String),

    /// A tile was requested but the compression code is not recognized.
    #[error("unsupported compression code {0}")]
    UnsupportedCompression(u16),

    /// A tag required by the requested operation is absent.
    #[error("required tag {0:?} is missing")]
    MissingTag(TagId),

    /// The file contains no image file directories at all.
    #[error("file contains no image file directories")]
    NoImages,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "object_store")]
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[cfg(feature = "reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// Crate-specific result type.
pub type AsyncCogResult<T> = std::result::Result<T, AsyncCogError>;
