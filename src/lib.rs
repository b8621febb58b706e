#![doc = include_str!("../README.md")]

mod cog;
pub mod error;
pub mod geo;
mod ghost;
mod ifd;
mod image;
pub mod reader;
mod tag;
pub mod tags;
mod view;

pub use cog::{CogReader, DEFAULT_READ_SIZE};
pub use ghost::GhostOptions;
pub use ifd::{IfdConfig, TiffVersion};
pub use image::{Image, Size, TileBounds, TileData, TileRange};
pub use reader::Source;
pub use tag::{InlineTag, LazyTag, OffsetTag, Tag, Value};
pub use view::ByteView;
