//! Top-level reader: the header protocol, the IFD chain walk and the image
//! pyramid it yields.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::error::{AsyncCogError, AsyncCogResult};
use crate::ghost::{GhostOptions, MAX_GHOST_SIZE};
use crate::ifd::{IfdConfig, TiffVersion};
use crate::image::Image;
use crate::reader::Source;
use crate::tag::Tag;
use crate::tags::TagId;
use crate::view::ByteView;

/// Bytes fetched per metadata block when no explicit header size is given.
pub const DEFAULT_READ_SIZE: u64 = 16 * 1024;

/// How far past its start an IFD must be resident before parsing begins.
const IFD_WINDOW: u64 = 1024;

/// A lazily-parsed Cloud Optimized GeoTIFF.
///
/// Opening parses the header, the GDAL ghost area and every IFD, then
/// prefetches each image's important tags in parallel. Tile bodies and bulk
/// tag arrays stay on the source until first use.
#[derive(Debug)]
pub struct CogReader {
    source: Arc<dyn Source>,
    version: TiffVersion,
    ghost: Option<GhostOptions>,
    images: Vec<Arc<Image>>,
}

impl CogReader {
    /// Open a COG with the default metadata prefetch.
    pub async fn open(source: Arc<dyn Source>) -> AsyncCogResult<Self> {
        Self::open_with(source, DEFAULT_READ_SIZE).await
    }

    /// Open a COG, prefetching `header_size` bytes of metadata up front.
    ///
    /// One fetch resolves the header and, for a well-formed COG, the whole
    /// IFD chain; further blocks are fetched only when an IFD sits outside
    /// the prefetched range.
    pub async fn open_with(source: Arc<dyn Source>, header_size: u64) -> AsyncCogResult<Self> {
        let bytes = source.fetch(0..header_size).await?;
        let mut view = ByteView::new(bytes, 0);

        // "II" is little-endian; "MM" files are rejected outright.
        if view.read_u16(0)? != 0x4949 {
            return Err(AsyncCogError::UnsupportedEndian);
        }
        let version = TiffVersion::parse(view.read_u16(2)?)?;
        let config = version.config();
        let (first_ifd, header_end) = match version {
            TiffVersion::Classic => (view.read_u32(4)? as u64, 8),
            TiffVersion::Big => {
                let offset_size = view.read_u16(4)?;
                if offset_size != 8 {
                    return Err(AsyncCogError::UnsupportedPointerSize(offset_size));
                }
                let reserved = view.read_u16(6)?;
                if reserved != 0 {
                    return Err(AsyncCogError::UnsupportedPointerSize(reserved));
                }
                (view.read_u64(8)?, 16)
            }
        };

        let ghost = read_ghost(&source, &view, header_end, first_ifd).await?;
        let tile_leader = ghost.as_ref().and_then(GhostOptions::tile_leader_byte_size);

        let mut images: Vec<Arc<Image>> = Vec::new();
        let mut next = first_ifd;
        while next != 0 {
            // the window shrinks near the end of a source of known size
            let window = match source.size() {
                Some(size) => IFD_WINDOW.min(size.saturating_sub(next)),
                None => IFD_WINDOW,
            };
            if window == 0 {
                return Err(AsyncCogError::IfdTruncated(next));
            }
            if !view.has_bytes(next, window) {
                view = fetch_block(&source, next).await?;
            }
            let (tags, next_offset) = read_ifd(config, &view, next)?;
            let base = images.first().cloned();
            images.push(Arc::new(Image::new(
                images.len(),
                Arc::clone(&source),
                tile_leader,
                tags,
                base,
            )));
            next = next_offset;
        }
        if images.is_empty() {
            return Err(AsyncCogError::NoImages);
        }
        debug!(
            ?version,
            images = images.len(),
            ghost = ghost.is_some(),
            "opened COG"
        );

        try_join_all(images.iter().map(|image| image.init(true))).await?;

        Ok(Self {
            source,
            version,
            ghost,
            images,
        })
    }

    /// The images in file order; index 0 is the full-resolution base, later
    /// entries progressively coarser overviews or mask sub-images.
    pub fn images(&self) -> &[Arc<Image>] {
        &self.images
    }

    /// Random access to one image.
    pub fn image(&self, index: usize) -> Option<&Arc<Image>> {
        self.images.get(index)
    }

    /// Container flavor (classic TIFF or BigTIFF).
    pub fn version(&self) -> TiffVersion {
        self.version
    }

    /// The GDAL ghost options, when the writer emitted them.
    pub fn ghost_options(&self) -> Option<&GhostOptions> {
        self.ghost.as_ref()
    }

    /// The shared byte source.
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    /// x/y/z resolution of every image, in the base image's units.
    pub fn resolutions(&self) -> AsyncCogResult<Vec<[f64; 3]>> {
        self.images.iter().map(|image| image.resolution()).collect()
    }

    /// The coarsest overview whose x-resolution is within `resolution`
    /// (plus a hundredth of tolerance), or the base image when no overview
    /// qualifies. The scan itself never selects the base.
    pub fn image_by_resolution(&self, resolution: f64) -> AsyncCogResult<&Arc<Image>> {
        for image in self.images.iter().skip(1).rev() {
            let [x, _, _] = image.resolution()?;
            if x - resolution <= 0.01 {
                return Ok(image);
            }
        }
        Ok(&self.images[0])
    }
}

async fn fetch_block(source: &Arc<dyn Source>, offset: u64) -> AsyncCogResult<ByteView> {
    let mut end = offset + DEFAULT_READ_SIZE;
    if let Some(size) = source.size() {
        end = end.min(size);
    }
    if end <= offset {
        return Err(AsyncCogError::IfdTruncated(offset));
    }
    let bytes = source.fetch(offset..end).await?;
    Ok(ByteView::new(bytes, offset))
}

async fn read_ghost(
    source: &Arc<dyn Source>,
    view: &ByteView,
    header_end: u64,
    first_ifd: u64,
) -> AsyncCogResult<Option<GhostOptions>> {
    let ghost_size = first_ifd.saturating_sub(header_end);
    if ghost_size == 0 || ghost_size >= MAX_GHOST_SIZE {
        return Ok(None);
    }
    let bytes = if view.has_bytes(header_end, ghost_size) {
        view.read_bytes(header_end, ghost_size)?
    } else {
        source.fetch(header_end..first_ifd).await?
    };
    let ghost = GhostOptions::parse(&bytes);
    debug!(keys = ghost.len(), "parsed GDAL ghost area");
    Ok(Some(ghost))
}

/// Parse the IFD at `offset`, returning its tag map and the next-IFD link.
/// Later entries with a duplicate id override earlier ones.
fn read_ifd(
    config: IfdConfig,
    view: &ByteView,
    offset: u64,
) -> AsyncCogResult<(HashMap<TagId, Tag>, u64)> {
    if !view.has_bytes(offset, config.tag_count_bytes as u64) {
        return Err(AsyncCogError::IfdTruncated(offset));
    }
    let count = view.read_uint(offset, config.tag_count_bytes)?;
    let entries_start = offset + config.tag_count_bytes as u64;
    let entries_len = count * config.entry_bytes as u64 + config.pointer_bytes as u64;
    if !view.has_bytes(entries_start, entries_len) {
        return Err(AsyncCogError::IfdTruncated(offset));
    }

    let mut tags = HashMap::with_capacity(count as usize);
    for index in 0..count {
        let entry_offset = entries_start + index * config.entry_bytes as u64;
        let tag = Tag::parse(config, view, entry_offset)?;
        tags.insert(tag.id(), tag);
    }

    let next = view.read_uint(
        entries_start + count * config.entry_bytes as u64,
        config.pointer_bytes,
    )?;
    Ok((tags, next))
}
