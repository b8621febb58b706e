//! The GDAL "ghost area": optional `KEY=VALUE` metadata written between the
//! header and the first IFD to advertise layout optimizations.

use std::collections::HashMap;

/// Upper bound on a plausible ghost area; anything larger is not a ghost
/// block and is ignored.
pub(crate) const MAX_GHOST_SIZE: u64 = 16 * 1024;

/// Parsed ghost options. Unknown keys are preserved verbatim.
#[derive(Debug, Clone, Default)]
pub struct GhostOptions {
    options: HashMap<String, String>,
}

impl GhostOptions {
    /// Parse a ghost block: ASCII `KEY=VALUE` pairs, one per line.
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut options = HashMap::new();
        for line in text.split('\n') {
            let line = line.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                options.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        GhostOptions { options }
    }

    /// Raw lookup of a ghost key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Number of parsed keys.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Size in bytes of the leader prepended to each tile holding its byte
    /// count.
    ///
    /// GDAL writes `BLOCK_LEADER=SIZE_AS_UINT4`; the explicit
    /// `BLOCK_LEADER_SIZE_AS_UINT4=<n>` spelling is accepted as well.
    pub fn tile_leader_byte_size(&self) -> Option<u64> {
        if let Some(value) = self.get("BLOCK_LEADER_SIZE_AS_UINT4") {
            return value.parse().ok();
        }
        match self.get("BLOCK_LEADER") {
            Some("SIZE_AS_UINT4") => Some(4),
            _ => None,
        }
    }

    /// Declared byte size of the structural metadata block itself, e.g.
    /// `GDAL_STRUCTURAL_METADATA_SIZE=000140 bytes`.
    pub fn structural_metadata_size(&self) -> Option<u64> {
        self.get("GDAL_STRUCTURAL_METADATA_SIZE")
            .and_then(|v| v.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    }

    /// Advertised file layout, e.g. `IFDS_BEFORE_DATA`.
    pub fn layout(&self) -> Option<&str> {
        self.get("LAYOUT")
    }

    /// Advertised tile ordering within the data section, e.g. `ROW_MAJOR`.
    pub fn block_order(&self) -> Option<&str> {
        self.get("BLOCK_ORDER")
    }

    /// Whether mask tiles are interleaved with the imagery tiles.
    pub fn mask_interleaved_with_imagery(&self) -> bool {
        self.get("MASK_INTERLEAVED_WITH_IMAGERY") == Some("YES")
    }

    /// True when a later writer edited the file in a way that invalidates
    /// the advertised optimizations.
    pub fn known_incompatible_edition(&self) -> bool {
        self.get("KNOWN_INCOMPATIBLE_EDITION") == Some("YES")
    }
}
