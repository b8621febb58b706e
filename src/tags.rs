//! Registries for tag ids, entry data types and coded tag values.

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::error::{AsyncCogError, AsyncCogResult};

/// TIFF tag ids the reader recognizes: baseline TIFF 6.0, the GeoTIFF
/// extension and the GDAL private tags. Anything else round-trips through
/// [`TagId::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum TagId {
    NewSubFileType = 254,
    SubFileType = 255,
    ImageWidth = 256,
    ImageHeight = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    ImageDescription = 270,
    StripOffsets = 273,
    Orientation = 274,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    MinSampleValue = 280,
    MaxSampleValue = 281,
    XResolution = 282,
    YResolution = 283,
    PlanarConfiguration = 284,
    ResolutionUnit = 296,
    Software = 305,
    DateTime = 306,
    Artist = 315,
    Predictor = 317,
    ColorMap = 320,
    TileWidth = 322,
    TileHeight = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SubIfd = 330,
    ExtraSamples = 338,
    SampleFormat = 339,
    JpegTables = 347,
    Copyright = 33432,
    ModelPixelScale = 33550,
    ModelTiePoint = 33922,
    ModelTransformation = 34264,
    GeoKeyDirectory = 34735,
    GeoDoubleParams = 34736,
    GeoAsciiParams = 34737,
    GdalMetadata = 42112,
    GdalNoData = 42113,
    /// A private or extension tag.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl TagId {
    /// Tags whose payload is a numeric array addressed element-by-element
    /// rather than decoded as one logical value.
    pub(crate) fn is_offset_array(self) -> bool {
        matches!(
            self,
            TagId::TileOffsets
                | TagId::TileByteCounts
                | TagId::StripOffsets
                | TagId::StripByteCounts
        )
    }
}

/// The data type of an IFD entry (TIFF 6.0 plus the BigTIFF additions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum DataType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Ifd = 13,
    Long8 = 16,
    SLong8 = 17,
    IfdLong8 = 18,
}

impl DataType {
    pub(crate) fn parse(code: u16) -> AsyncCogResult<Self> {
        Self::try_from(code).map_err(|_| AsyncCogError::UnknownDataType(code))
    }

    /// Byte width of a single element.
    pub fn size(self) -> u64 {
        match self {
            DataType::Byte | DataType::Ascii | DataType::SByte | DataType::Undefined => 1,
            DataType::Short | DataType::SShort => 2,
            DataType::Long | DataType::SLong | DataType::Float | DataType::Ifd => 4,
            DataType::Rational
            | DataType::SRational
            | DataType::Double
            | DataType::Long8
            | DataType::SLong8
            | DataType::IfdLong8 => 8,
        }
    }
}

/// Compression scheme codes.
///
/// The reader never decompresses; the code only picks the MIME type tiles
/// are emitted under and whether JPEG table splicing applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    OldJpeg = 6,
    Jpeg = 7,
    Deflate = 8,
    PackBits = 32773,
    DeflateOld = 32946,
    Lerc = 34887,
    Zstd = 50000,
    Webp = 50001,
    /// A custom or unrecognized compression code.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl Compression {
    /// MIME type advertised alongside emitted tile payloads.
    pub fn mime_type(self) -> &'static str {
        match self {
            Compression::OldJpeg | Compression::Jpeg => "image/jpeg",
            Compression::Webp => "image/webp",
            Compression::Lzw => "application/x-lzw",
            Compression::Deflate | Compression::DeflateOld => "application/deflate",
            Compression::Zstd => "application/zstd",
            Compression::Lerc => "application/lerc",
            _ => "application/octet-stream",
        }
    }
}

/// The color space of the image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum PhotometricInterpretation {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    Rgb = 2,
    Palette = 3,
    TransparencyMask = 4,
    Cmyk = 5,
    YCbCr = 6,
    CieLab = 8,
}

/// How each data sample should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum SampleFormat {
    Uint = 1,
    Int = 2,
    Float = 3,
    Void = 4,
}
