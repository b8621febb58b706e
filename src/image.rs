//! Per-IFD accessor surface: tags, geo keys, derived geometry, tiles and
//! strips.

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use futures::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::trace;

use crate::error::{AsyncCogError, AsyncCogResult};
use crate::geo::{unpack_geo_keys, GeoKey, GeoValue, USER_DEFINED};
use crate::reader::Source;
use crate::tag::{OffsetTag, Tag, Value};
use crate::tags::{Compression, PhotometricInterpretation, SampleFormat, TagId};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Pixel rectangle of a tile, clamped to the image edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Byte location of one tile or strip payload. A zero `offset` marks a
/// sparse chunk that has no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub offset: u64,
    pub byte_count: u64,
}

/// An opaque tile or strip payload plus the MIME type it should be served
/// under.
#[derive(Debug, Clone)]
pub struct TileData {
    pub mime: &'static str,
    pub bytes: Bytes,
}

/// Tags prefetched by [`Image::init`] so the synchronous accessors can
/// answer without further I/O.
const IMPORTANT_TAGS: &[TagId] = &[
    TagId::SamplesPerPixel,
    TagId::SampleFormat,
    TagId::BitsPerSample,
    TagId::Compression,
    TagId::ImageHeight,
    TagId::ImageWidth,
    TagId::ModelPixelScale,
    TagId::ModelTiePoint,
    TagId::ModelTransformation,
    TagId::TileHeight,
    TagId::TileWidth,
];

const GEO_TAGS: &[TagId] = &[
    TagId::GeoKeyDirectory,
    TagId::GeoAsciiParams,
    TagId::GeoDoubleParams,
];

/// One image of the pyramid: the full-resolution base, an overview, or a
/// mask sub-image.
///
/// Images hold their own handle to the shared [`Source`], so they stay
/// usable independent of the reader that produced them. Overviews keep an
/// `Arc` to the base image for geometry delegation; the base itself holds
/// `None`.
#[derive(Debug)]
pub struct Image {
    id: usize,
    source: Arc<dyn Source>,
    tile_leader: Option<u64>,
    tags: HashMap<TagId, Tag>,
    base: Option<Arc<Image>>,
    geo_keys: OnceCell<HashMap<GeoKey, GeoValue>>,
    init: OnceCell<()>,
}

impl Image {
    pub(crate) fn new(
        id: usize,
        source: Arc<dyn Source>,
        tile_leader: Option<u64>,
        tags: HashMap<TagId, Tag>,
        base: Option<Arc<Image>>,
    ) -> Self {
        Self {
            id,
            source,
            tile_leader,
            tags,
            base,
            geo_keys: OnceCell::new(),
            init: OnceCell::new(),
        }
    }

    /// Index of this image within the file; 0 is the full-resolution base.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Raw access to a parsed tag.
    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    /// The decoded value of `id` iff it is already resident. Never performs
    /// I/O.
    pub fn value(&self, id: TagId) -> Option<&Value> {
        self.tags.get(&id).and_then(Tag::value)
    }

    /// The decoded value of `id`, fetching it first if needed.
    ///
    /// Offset arrays are materialized wholesale on first access and lazy
    /// blobs fetched once; either way concurrent callers share a single
    /// in-flight request per tag.
    pub async fn fetch_value(&self, id: TagId) -> AsyncCogResult<Option<&Value>> {
        let Some(tag) = self.tags.get(&id) else {
            return Ok(None);
        };
        match tag {
            Tag::Inline(t) => Ok(Some(&t.value)),
            Tag::Lazy(t) => {
                let value = t
                    .value
                    .get_or_try_init(|| async {
                        let length = t.count * t.data_type.size();
                        let bytes = self.fetch_exact(t.value_offset, length).await?;
                        Value::decode(&bytes, t.data_type, t.count)
                    })
                    .await?;
                Ok(Some(value))
            }
            Tag::Offset(t) => Ok(Some(self.load_offset_array(t).await?)),
        }
    }

    /// Load an offset-array tag in one fetch, normalized to `u64` elements.
    async fn load_offset_array<'a>(&self, tag: &'a OffsetTag) -> AsyncCogResult<&'a Value> {
        tag.values
            .get_or_try_init(|| async {
                let length = tag.count * tag.data_type.size();
                let bytes = self.fetch_exact(tag.value_offset, length).await?;
                let value = Value::decode(&bytes, tag.data_type, tag.count)?;
                Ok(match value {
                    Value::Shorts(v) => Value::Longs(v.into_iter().map(u64::from).collect()),
                    Value::Short(v) => Value::Longs(vec![v as u64]),
                    Value::Long(v) => Value::Longs(vec![v as u64]),
                    Value::Long8(v) => Value::Longs(vec![v]),
                    other => other,
                })
            })
            .await
    }

    /// Element `index` of a numeric array tag, fetching the array on first
    /// use.
    async fn array_element(&self, id: TagId, index: u64) -> AsyncCogResult<u64> {
        let value = self
            .fetch_value(id)
            .await?
            .ok_or(AsyncCogError::MissingTag(id))?;
        let element = match value {
            Value::Longs(v) => v.get(index as usize).copied(),
            Value::Shorts(v) => v.get(index as usize).map(|&v| v as u64),
            other if index == 0 => other.as_u64(),
            _ => None,
        };
        element.ok_or(AsyncCogError::IndexOutOfBounds {
            index,
            limit: self.tags.get(&id).map(Tag::count).unwrap_or(0),
        })
    }

    async fn fetch_exact(&self, offset: u64, length: u64) -> AsyncCogResult<Bytes> {
        let bytes = self.source.fetch(offset..offset + length).await?;
        if (bytes.len() as u64) < length {
            return Err(AsyncCogError::ShortRead {
                expected: length,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }

    /// Prefetch the important tags — and by default the geo keys — so the
    /// synchronous accessors work without I/O.
    ///
    /// Idempotent and safe to race: every caller shares the first run.
    pub async fn init(&self, load_geo_keys: bool) -> AsyncCogResult<()> {
        self.init
            .get_or_try_init(|| async {
                try_join_all(IMPORTANT_TAGS.iter().map(|&id| self.fetch_value(id))).await?;
                if load_geo_keys {
                    try_join_all(GEO_TAGS.iter().map(|&id| self.fetch_value(id))).await?;
                    self.load_geo_keys().await?;
                }
                Ok(())
            })
            .await
            .map(|_: &()| ())
    }

    /// Unpack the GeoKeyDirectory into a key→value map. The second call is
    /// a no-op.
    pub async fn load_geo_keys(&self) -> AsyncCogResult<()> {
        self.geo_keys
            .get_or_try_init(|| async {
                let Some(directory) = self.fetch_value(TagId::GeoKeyDirectory).await? else {
                    return Ok(HashMap::new());
                };
                let directory = directory.as_shorts().ok_or_else(|| {
                    AsyncCogError::GeoKeyMalformed("GeoKeyDirectory is not a SHORT array".into())
                })?;
                let ascii = self
                    .fetch_value(TagId::GeoAsciiParams)
                    .await?
                    .and_then(|v| v.as_str());
                let doubles = self
                    .fetch_value(TagId::GeoDoubleParams)
                    .await?
                    .and_then(|v| v.as_doubles());
                unpack_geo_keys(directory, ascii, doubles)
            })
            .await
            .map(|_| ())
    }

    /// Whether [`Image::load_geo_keys`] has run.
    pub fn is_geo_loaded(&self) -> bool {
        self.geo_keys.get().is_some()
    }

    /// Look up an unpacked geo key. Errors if the keys were never loaded.
    pub fn value_geo(&self, key: GeoKey) -> AsyncCogResult<Option<&GeoValue>> {
        let keys = self.geo_keys.get().ok_or(AsyncCogError::GeoNotLoaded)?;
        Ok(keys.get(&key))
    }

    fn required_u64(&self, id: TagId) -> AsyncCogResult<u64> {
        self.value(id)
            .and_then(Value::as_u64)
            .ok_or(AsyncCogError::MissingTag(id))
    }

    /// Image dimensions in pixels.
    pub fn size(&self) -> AsyncCogResult<Size> {
        Ok(Size {
            width: self.required_u64(TagId::ImageWidth)? as u32,
            height: self.required_u64(TagId::ImageHeight)? as u32,
        })
    }

    /// `NewSubFileType`, when present.
    pub fn new_sub_file_type(&self) -> Option<u64> {
        self.value(TagId::NewSubFileType).and_then(Value::as_u64)
    }

    fn is_sub_image(&self) -> bool {
        self.new_sub_file_type() == Some(1)
    }

    /// World coordinates of the top-left pixel.
    pub fn origin(&self) -> AsyncCogResult<[f64; 3]> {
        if let Some(tie) = self.value(TagId::ModelTiePoint).and_then(Value::as_doubles) {
            if tie.len() >= 6 {
                return Ok([tie[3], tie[4], tie[5]]);
            }
        }
        if let Some(m) = self
            .value(TagId::ModelTransformation)
            .and_then(Value::as_doubles)
        {
            if m.len() >= 12 {
                return Ok([m[3], m[7], m[11]]);
            }
        }
        if self.is_sub_image() {
            if let Some(base) = &self.base {
                return base.origin();
            }
        }
        Err(AsyncCogError::NoGeoTransform)
    }

    /// Pixel resolution `(x, y, z)`. The y component is negated because
    /// raster rows grow downward while world y grows up.
    pub fn resolution(&self) -> AsyncCogResult<[f64; 3]> {
        if let Some(scale) = self
            .value(TagId::ModelPixelScale)
            .and_then(Value::as_doubles)
        {
            if scale.len() >= 3 {
                return Ok([scale[0], -scale[1], scale[2]]);
            }
        }
        if let Some(m) = self
            .value(TagId::ModelTransformation)
            .and_then(Value::as_doubles)
        {
            if m.len() >= 12 {
                return Ok([m[0], m[5], m[10]]);
            }
        }
        if self.is_sub_image() {
            if let Some(base) = &self.base {
                let [rx, ry, rz] = base.resolution()?;
                let scale = base.size()?.width as f64 / self.size()?.width as f64;
                return Ok([rx * scale, ry * scale, rz]);
            }
        }
        Err(AsyncCogError::NoGeoTransform)
    }

    /// Bounding box `[min_x, min_y, max_x, max_y]` in world coordinates.
    pub fn bbox(&self) -> AsyncCogResult<[f64; 4]> {
        let size = self.size()?;
        let [x1, y1, _] = self.origin()?;
        let [rx, ry, _] = self.resolution()?;
        let x2 = x1 + rx * size.width as f64;
        let y2 = y1 + ry * size.height as f64;
        Ok([x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)])
    }

    /// True when the image carries a usable geo transform.
    pub fn is_geo_located(&self) -> bool {
        self.tags.contains_key(&TagId::ModelPixelScale)
            || self.tags.contains_key(&TagId::ModelTransformation)
    }

    /// The EPSG code of the image CRS: the projected CS type unless it is
    /// absent or user-defined, then the geographic type. User-defined
    /// yields `None`.
    pub fn epsg(&self) -> AsyncCogResult<Option<u16>> {
        let projected = self
            .value_geo(GeoKey::ProjectedCSType)?
            .and_then(GeoValue::as_u16);
        let code = match projected {
            // geographic-only images carry no projected CS key at all
            None | Some(USER_DEFINED) => self
                .value_geo(GeoKey::GeographicType)?
                .and_then(GeoValue::as_u16),
            other => other,
        };
        Ok(code.filter(|&c| c != USER_DEFINED))
    }

    /// Compression scheme, when the tag is present.
    pub fn compression(&self) -> Option<Compression> {
        self.value(TagId::Compression)
            .and_then(Value::as_u64)
            .map(|v| Compression::from(v as u16))
    }

    /// The color space of the image data.
    pub fn photometric_interpretation(&self) -> Option<PhotometricInterpretation> {
        self.value(TagId::PhotometricInterpretation)
            .and_then(Value::as_u64)
            .and_then(|v| PhotometricInterpretation::try_from(v as u16).ok())
    }

    /// Number of components per pixel.
    pub fn samples_per_pixel(&self) -> Option<u16> {
        self.value(TagId::SamplesPerPixel)
            .and_then(Value::as_u64)
            .map(|v| v as u16)
    }

    /// Bits per component; scalar tags widen to a one-element vector.
    pub fn bits_per_sample(&self) -> Option<Vec<u16>> {
        self.value(TagId::BitsPerSample).and_then(Value::to_u16_vec)
    }

    /// Sample format of the first component.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        let value = self.value(TagId::SampleFormat)?;
        let code = match value {
            Value::Shorts(v) => *v.first()? as u64,
            other => other.as_u64()?,
        };
        SampleFormat::try_from(code as u16).ok()
    }

    /// GDAL nodata marker, parsed from its ASCII tag.
    pub fn gdal_no_data(&self) -> Option<f64> {
        self.value(TagId::GdalNoData)
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok())
    }

    /// True when the image stores tiles rather than strips.
    pub fn is_tiled(&self) -> bool {
        self.tags.contains_key(&TagId::TileWidth)
    }

    /// Tile dimensions in pixels.
    pub fn tile_size(&self) -> AsyncCogResult<Size> {
        Ok(Size {
            width: self.required_u64(TagId::TileWidth)? as u32,
            height: self.required_u64(TagId::TileHeight)? as u32,
        })
    }

    /// Tile grid dimensions: `(across, down, total)`.
    pub fn tile_count(&self) -> AsyncCogResult<(u32, u32, u64)> {
        let size = self.size()?;
        let tile = self.tile_size()?;
        let across = size.width.div_ceil(tile.width);
        let down = size.height.div_ceil(tile.height);
        Ok((across, down, across as u64 * down as u64))
    }

    /// Number of strips, without fetching anything.
    pub fn strip_count(&self) -> u64 {
        self.tags
            .get(&TagId::StripByteCounts)
            .map(Tag::count)
            .unwrap_or(0)
    }

    /// The TileOffsets array, loading it on first use.
    pub async fn tile_offsets(&self) -> AsyncCogResult<Option<&[u64]>> {
        Ok(self
            .fetch_value(TagId::TileOffsets)
            .await?
            .and_then(Value::as_longs))
    }

    /// Pixel bounds of tile `(x, y)`, clamped at the right and bottom
    /// edges.
    pub fn tile_bounds(&self, x: u32, y: u32) -> AsyncCogResult<TileBounds> {
        let size = self.size()?;
        let tile = self.tile_size()?;
        let px = x * tile.width;
        let py = y * tile.height;
        Ok(TileBounds {
            x: px,
            y: py,
            width: tile.width.min(size.width.saturating_sub(px)),
            height: tile.height.min(size.height.saturating_sub(py)),
        })
    }

    /// True iff tile `(x, y)` exists and has data. Out-of-range coordinates
    /// are simply `false`.
    pub async fn has_tile(&self, x: u32, y: u32) -> AsyncCogResult<bool> {
        let (across, down, _) = self.tile_count()?;
        if x >= across || y >= down {
            return Ok(false);
        }
        let index = y as u64 * across as u64 + x as u64;
        let offset = self.array_element(TagId::TileOffsets, index).await?;
        Ok(offset != 0)
    }

    /// Byte range of tile `index`.
    ///
    /// When the ghost options advertise a tile leader, the byte count comes
    /// from one tiny read right in front of the tile body instead of
    /// materializing the whole TileByteCounts array.
    pub async fn tile_byte_range(&self, index: u64) -> AsyncCogResult<TileRange> {
        let (_, _, total) = self.tile_count()?;
        if index >= total {
            return Err(AsyncCogError::IndexOutOfBounds {
                index,
                limit: total,
            });
        }
        let offset = self.array_element(TagId::TileOffsets, index).await?;
        if offset == 0 {
            return Ok(TileRange {
                offset: 0,
                byte_count: 0,
            });
        }
        // leaders wider than a u64 cannot come from a sane writer
        if let Some(leader) = self.tile_leader.filter(|l| (1..=8).contains(l)) {
            if let Some(leader_offset) = offset.checked_sub(leader) {
                let bytes = self.fetch_exact(leader_offset, leader).await?;
                let byte_count = LittleEndian::read_uint(&bytes, leader as usize);
                return Ok(TileRange { offset, byte_count });
            }
        }
        let byte_count = self.array_element(TagId::TileByteCounts, index).await?;
        Ok(TileRange { offset, byte_count })
    }

    /// Fetch tile `(x, y)`. Sparse tiles yield `None` without touching the
    /// source.
    pub async fn tile(&self, x: u32, y: u32) -> AsyncCogResult<Option<TileData>> {
        let (across, down, total) = self.tile_count()?;
        if x >= across || y >= down {
            return Err(AsyncCogError::IndexOutOfBounds {
                index: y as u64 * across as u64 + x as u64,
                limit: total,
            });
        }
        let index = y as u64 * across as u64 + x as u64;
        let range = self.tile_byte_range(index).await?;
        if range.offset == 0 {
            return Ok(None);
        }
        trace!(
            image = self.id,
            x,
            y,
            offset = range.offset,
            bytes = range.byte_count,
            "fetching tile"
        );
        let bytes = self.fetch_exact(range.offset, range.byte_count).await?;
        Ok(Some(self.emit_chunk(bytes).await?))
    }

    /// Fetch strip `index`. Sparse strips yield `None`.
    pub async fn strip(&self, index: u64) -> AsyncCogResult<Option<TileData>> {
        let limit = self.strip_count();
        if index >= limit {
            return Err(AsyncCogError::IndexOutOfBounds { index, limit });
        }
        let offset = self.array_element(TagId::StripOffsets, index).await?;
        if offset == 0 {
            return Ok(None);
        }
        let byte_count = self.array_element(TagId::StripByteCounts, index).await?;
        let bytes = self.fetch_exact(offset, byte_count).await?;
        Ok(Some(self.emit_chunk(bytes).await?))
    }

    /// Wrap a fetched payload with its MIME type, splicing the shared JPEG
    /// tables in when the compression calls for it.
    async fn emit_chunk(&self, bytes: Bytes) -> AsyncCogResult<TileData> {
        // an absent Compression tag means uncompressed (TIFF baseline
        // default); only an unrecognized code is rejected
        let compression = match self.compression() {
            None => Compression::None,
            Some(Compression::Unknown(code)) => {
                return Err(AsyncCogError::UnsupportedCompression(code))
            }
            Some(compression) => compression,
        };
        if compression == Compression::Jpeg {
            if let Some(Value::Undefined(tables)) = self.fetch_value(TagId::JpegTables).await? {
                return Ok(TileData {
                    mime: compression.mime_type(),
                    bytes: splice_jpeg_tables(tables, &bytes),
                });
            }
        }
        Ok(TileData {
            mime: compression.mime_type(),
            bytes,
        })
    }
}

/// Rebuild a standalone JPEG from a table-less tile: the shared tables
/// minus their trailing EOI, then the payload minus its duplicated SOI.
fn splice_jpeg_tables(tables: &Bytes, payload: &Bytes) -> Bytes {
    if tables.len() < 2 || payload.len() < 2 {
        return payload.clone();
    }
    let mut out = Vec::with_capacity(tables.len() + payload.len() - 4);
    out.extend_from_slice(&tables[..tables.len() - 2]);
    out.extend_from_slice(&payload[2..]);
    out.into()
}
