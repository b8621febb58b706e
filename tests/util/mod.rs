//! Shared test helpers: an in-memory recording source and a little-endian
//! TIFF builder.
#![allow(dead_code)]

use std::ops::Range;
use std::sync::Mutex;

use async_cog::error::AsyncCogResult;
use async_cog::tags::{DataType, TagId};
use async_cog::{Source, TiffVersion};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

/// An in-memory [`Source`] that records every fetched range, so tests can
/// assert how many round trips an operation cost and which bytes it touched.
#[derive(Debug)]
pub struct MemSource {
    bytes: Bytes,
    fetches: Mutex<Vec<Range<u64>>>,
}

impl MemSource {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    /// All ranges fetched so far, in order.
    pub fn fetched_ranges(&self) -> Vec<Range<u64>> {
        self.fetches.lock().unwrap().clone()
    }

    /// True if any recorded fetch intersects `range`.
    pub fn fetched_overlapping(&self, range: Range<u64>) -> bool {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
    }
}

impl Source for MemSource {
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        self.fetches.lock().unwrap().push(range.clone());
        let len = self.bytes.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len) as usize;
        let slice = self.bytes.slice(start..end);
        async move { Ok(slice) }.boxed()
    }

    fn size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

/// Builds little-endian classic TIFF / BigTIFF byte streams: header, an
/// optional ghost block, a chain of IFDs, external tag payloads, and raw
/// data patched in at fixed offsets (tile and strip bodies).
pub struct TiffBuilder {
    version: TiffVersion,
    ghost: Vec<u8>,
    ifds: Vec<IfdBuilder>,
    patches: Vec<(u64, Vec<u8>)>,
}

pub struct IfdBuilder {
    entries: Vec<Entry>,
}

struct Entry {
    id: u16,
    data_type: DataType,
    count: u64,
    payload: Vec<u8>,
}

impl TiffBuilder {
    pub fn new(version: TiffVersion) -> Self {
        Self {
            version,
            ghost: Vec::new(),
            ifds: Vec::new(),
            patches: Vec::new(),
        }
    }

    pub fn classic() -> Self {
        Self::new(TiffVersion::Classic)
    }

    pub fn big() -> Self {
        Self::new(TiffVersion::Big)
    }

    /// Place a GDAL-style ghost block between the header and the first IFD.
    pub fn ghost(&mut self, text: &str) -> &mut Self {
        self.ghost = text.as_bytes().to_vec();
        self
    }

    /// Append a new IFD to the chain.
    pub fn ifd(&mut self) -> &mut IfdBuilder {
        self.ifds.push(IfdBuilder {
            entries: Vec::new(),
        });
        self.ifds.last_mut().unwrap()
    }

    /// Write raw bytes at a fixed absolute offset, padding the file with
    /// zeros as needed. Used for tile/strip bodies and leaders.
    pub fn data_at(&mut self, offset: u64, bytes: &[u8]) -> &mut Self {
        self.patches.push((offset, bytes.to_vec()));
        self
    }

    pub fn build(&self) -> Bytes {
        let config = self.version.config();
        let pointer = config.pointer_bytes as usize;
        let header_len: u64 = match self.version {
            TiffVersion::Classic => 8,
            TiffVersion::Big => 16,
        };

        // lay out the IFD chain right after the ghost block
        let mut cursor = header_len + self.ghost.len() as u64;
        let mut ifd_offsets = Vec::with_capacity(self.ifds.len());
        for ifd in &self.ifds {
            ifd_offsets.push(cursor);
            cursor += config.tag_count_bytes as u64
                + ifd.entries.len() as u64 * config.entry_bytes as u64
                + config.pointer_bytes as u64;
        }

        // then the external payloads, word-aligned
        let mut external: Vec<Vec<Option<u64>>> = Vec::with_capacity(self.ifds.len());
        for ifd in &self.ifds {
            let mut offsets = Vec::with_capacity(ifd.entries.len());
            for entry in &ifd.entries {
                if entry.payload.len() > pointer {
                    cursor += cursor % 2;
                    offsets.push(Some(cursor));
                    cursor += entry.payload.len() as u64;
                } else {
                    offsets.push(None);
                }
            }
            external.push(offsets);
        }

        let mut out = vec![0u8; cursor as usize];
        let first_ifd = ifd_offsets.first().copied().unwrap_or(0);

        LittleEndian::write_u16(&mut out[0..], 0x4949);
        match self.version {
            TiffVersion::Classic => {
                LittleEndian::write_u16(&mut out[2..], 42);
                LittleEndian::write_u32(&mut out[4..], first_ifd as u32);
            }
            TiffVersion::Big => {
                LittleEndian::write_u16(&mut out[2..], 43);
                LittleEndian::write_u16(&mut out[4..], 8);
                LittleEndian::write_u16(&mut out[6..], 0);
                LittleEndian::write_u64(&mut out[8..], first_ifd);
            }
        }
        out[header_len as usize..header_len as usize + self.ghost.len()]
            .copy_from_slice(&self.ghost);

        for (i, ifd) in self.ifds.iter().enumerate() {
            let mut pos = ifd_offsets[i] as usize;
            write_uint(&mut out[pos..], ifd.entries.len() as u64, config.tag_count_bytes);
            pos += config.tag_count_bytes as usize;
            for (j, entry) in ifd.entries.iter().enumerate() {
                LittleEndian::write_u16(&mut out[pos..], entry.id);
                LittleEndian::write_u16(&mut out[pos + 2..], u16::from(entry.data_type));
                write_uint(&mut out[pos + 4..], entry.count, config.pointer_bytes);
                let slot = pos + 4 + pointer;
                match external[i][j] {
                    Some(offset) => {
                        write_uint(&mut out[slot..], offset, config.pointer_bytes);
                        out[offset as usize..offset as usize + entry.payload.len()]
                            .copy_from_slice(&entry.payload);
                    }
                    None => {
                        out[slot..slot + entry.payload.len()].copy_from_slice(&entry.payload)
                    }
                }
                pos += config.entry_bytes as usize;
            }
            let next = ifd_offsets.get(i + 1).copied().unwrap_or(0);
            write_uint(&mut out[pos..], next, config.pointer_bytes);
        }

        for (offset, bytes) in &self.patches {
            let end = *offset as usize + bytes.len();
            if out.len() < end {
                out.resize(end, 0);
            }
            out[*offset as usize..end].copy_from_slice(bytes);
        }

        out.into()
    }
}

impl IfdBuilder {
    fn entry(&mut self, id: TagId, data_type: DataType, count: u64, payload: Vec<u8>) -> &mut Self {
        self.entries.push(Entry {
            id: u16::from(id),
            data_type,
            count,
            payload,
        });
        self
    }

    pub fn short(&mut self, id: TagId, value: u16) -> &mut Self {
        self.entry(id, DataType::Short, 1, value.to_le_bytes().to_vec())
    }

    pub fn shorts(&mut self, id: TagId, values: &[u16]) -> &mut Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entry(id, DataType::Short, values.len() as u64, payload)
    }

    pub fn long(&mut self, id: TagId, value: u32) -> &mut Self {
        self.entry(id, DataType::Long, 1, value.to_le_bytes().to_vec())
    }

    pub fn longs(&mut self, id: TagId, values: &[u32]) -> &mut Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entry(id, DataType::Long, values.len() as u64, payload)
    }

    pub fn long8(&mut self, id: TagId, value: u64) -> &mut Self {
        self.entry(id, DataType::Long8, 1, value.to_le_bytes().to_vec())
    }

    pub fn long8s(&mut self, id: TagId, values: &[u64]) -> &mut Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entry(id, DataType::Long8, values.len() as u64, payload)
    }

    pub fn doubles(&mut self, id: TagId, values: &[f64]) -> &mut Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entry(id, DataType::Double, values.len() as u64, payload)
    }

    pub fn ascii(&mut self, id: TagId, value: &str) -> &mut Self {
        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        let count = payload.len() as u64;
        self.entry(id, DataType::Ascii, count, payload)
    }

    pub fn undefined(&mut self, id: TagId, bytes: &[u8]) -> &mut Self {
        self.entry(id, DataType::Undefined, bytes.len() as u64, bytes.to_vec())
    }
}

fn write_uint(buf: &mut [u8], value: u64, width: u8) {
    LittleEndian::write_uint(buf, value, width as usize);
}
