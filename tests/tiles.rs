mod util;

use std::sync::Arc;

use async_cog::error::AsyncCogError;
use async_cog::tags::TagId;
use async_cog::{CogReader, TileRange};
use util::{MemSource, TiffBuilder};

/// 64x48 image with 16 px tiles: a 4x3 grid of 12 tiles.
fn tiled(offsets: &[u32], byte_counts: &[u32]) -> TiffBuilder {
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 64)
        .short(TagId::ImageHeight, 48)
        .short(TagId::TileWidth, 16)
        .short(TagId::TileHeight, 16)
        .short(TagId::Compression, 1)
        .longs(TagId::TileOffsets, offsets)
        .longs(TagId::TileByteCounts, byte_counts);
    builder
}

#[tokio::test]
async fn tile_grid_and_fetch() {
    let offsets: Vec<u32> = (0..12).map(|i| 0x1000 + i * 0x100).collect();
    let byte_counts = [16u32; 12];
    let mut builder = tiled(&offsets, &byte_counts);
    for (i, offset) in offsets.iter().enumerate() {
        builder.data_at(*offset as u64, &[i as u8; 16]);
    }
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();
    let image = &cog.images()[0];

    assert!(image.is_tiled());
    assert_eq!(image.tile_count().unwrap(), (4, 3, 12));

    // idx = y * across + x
    let tile = image.tile(2, 1).await.unwrap().expect("tile has data");
    assert_eq!(&tile.bytes[..], &[6u8; 16]);
    assert_eq!(tile.mime, "application/octet-stream");
    assert_eq!(tile.bytes.len() as u64, 16);
}

#[tokio::test]
async fn sparse_tile_is_null_without_fetch() {
    let mut offsets: Vec<u32> = (0..12).map(|i| 0x1000 + i * 0x100).collect();
    offsets[7] = 0;
    let mut builder = tiled(&offsets, &[16u32; 12]);
    for (i, offset) in offsets.iter().enumerate() {
        if *offset != 0 {
            builder.data_at(*offset as u64, &[i as u8; 16]);
        }
    }
    let source = Arc::new(MemSource::new(builder.build()));
    // small metadata prefetch so the tile region stays untouched by open
    let cog = CogReader::open_with(source.clone(), 0x800).await.unwrap();
    let image = &cog.images()[0];

    let before = source.fetch_count();
    // idx 7 is (x=3, y=1)
    assert!(!image.has_tile(3, 1).await.unwrap());
    // one fetch: the TileOffsets array
    assert_eq!(source.fetch_count(), before + 1);

    assert!(image.tile(3, 1).await.unwrap().is_none());
    assert_eq!(source.fetch_count(), before + 1);
    assert!(!source.fetched_overlapping(0x1000..0x2000));

    assert!(image.has_tile(0, 0).await.unwrap());
}

#[tokio::test]
async fn tile_leader_skips_byte_counts() {
    let mut offsets = [0x5000u32; 12];
    offsets[5] = 0x1000;
    // deliberately wrong byte counts: the leader must win
    let mut builder = tiled(&offsets, &[1u32; 12]);
    builder.ghost("BLOCK_LEADER_SIZE_AS_UINT4=4\n");
    let mut block = vec![0xCD, 0xAB, 0x00, 0x00]; // little-endian 0xABCD
    block.extend_from_slice(&vec![0x77u8; 0xABCD]);
    builder.data_at(0x0FFC, &block);

    let source = Arc::new(MemSource::new(builder.build()));
    // small metadata prefetch so leader reads are visible in the fetch log
    let cog = CogReader::open_with(source.clone(), 0x800).await.unwrap();
    let image = &cog.images()[0];

    let before = source.fetch_count();
    let range = image.tile_byte_range(5).await.unwrap();
    assert_eq!(
        range,
        TileRange {
            offset: 0x1000,
            byte_count: 0xABCD
        }
    );
    // the TileOffsets array plus the four-byte leader, nothing else
    assert_eq!(source.fetch_count(), before + 2);
    assert!(source.fetched_overlapping(0x0FFC..0x1000));

    let tile = image.tile(1, 1).await.unwrap().expect("tile has data");
    assert_eq!(tile.bytes.len(), 0xABCD);
    assert_eq!(tile.bytes[0], 0x77);
}

#[tokio::test]
async fn jpeg_tables_are_spliced() {
    let tables = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x04, 0x01, 0x02, 0xFF, 0xD9];
    let payload = [0xFF, 0xD8, 0xAA, 0xBB, 0xCC, 0xFF, 0xD9];
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 16)
        .short(TagId::ImageHeight, 16)
        .short(TagId::TileWidth, 16)
        .short(TagId::TileHeight, 16)
        .short(TagId::Compression, 7)
        .undefined(TagId::JpegTables, &tables)
        .long(TagId::TileOffsets, 0x800)
        .long(TagId::TileByteCounts, payload.len() as u32);
    builder.data_at(0x800, &payload);

    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();
    let tile = cog.images()[0].tile(0, 0).await.unwrap().unwrap();

    assert_eq!(tile.mime, "image/jpeg");
    assert_eq!(tile.bytes.len(), tables.len() + payload.len() - 4);
    assert_eq!(&tile.bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(&tile.bytes[tile.bytes.len() - 2..], &[0xFF, 0xD9]);
    // table body then payload body, with the duplicated markers gone
    assert_eq!(&tile.bytes[2..4], &[0xFF, 0xDB]);
    assert_eq!(&tile.bytes[tile.bytes.len() - 5..tile.bytes.len() - 2], &[0xAA, 0xBB, 0xCC]);
}

#[tokio::test]
async fn edge_tiles_are_clamped() {
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 100)
        .short(TagId::ImageHeight, 90)
        .short(TagId::TileWidth, 64)
        .short(TagId::TileHeight, 64)
        .longs(TagId::TileOffsets, &[0, 0, 0, 0])
        .longs(TagId::TileByteCounts, &[0, 0, 0, 0]);
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();
    let image = &cog.images()[0];

    let full = image.tile_bounds(0, 0).unwrap();
    assert_eq!((full.width, full.height), (64, 64));

    let corner = image.tile_bounds(1, 1).unwrap();
    assert_eq!((corner.x, corner.y), (64, 64));
    assert_eq!((corner.width, corner.height), (36, 26));
}

#[tokio::test]
async fn out_of_range_indices() {
    let source = Arc::new(MemSource::new(
        tiled(&[0x1000; 12], &[16; 12]).build(),
    ));
    let cog = CogReader::open(source).await.unwrap();
    let image = &cog.images()[0];

    assert!(!image.has_tile(4, 0).await.unwrap());
    assert!(!image.has_tile(0, 3).await.unwrap());
    assert!(matches!(
        image.tile(4, 0).await,
        Err(AsyncCogError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        image.tile_byte_range(12).await,
        Err(AsyncCogError::IndexOutOfBounds {
            index: 12,
            limit: 12
        })
    ));
}

#[tokio::test]
async fn short_tile_read_errors() {
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 16)
        .short(TagId::ImageHeight, 16)
        .short(TagId::TileWidth, 16)
        .short(TagId::TileHeight, 16)
        .long(TagId::TileOffsets, 0x900)
        .long(TagId::TileByteCounts, 100);
    builder.data_at(0x900, &[1u8; 10]); // file ends 90 bytes early
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();

    assert!(matches!(
        cog.images()[0].tile(0, 0).await,
        Err(AsyncCogError::ShortRead {
            expected: 100,
            actual: 10
        })
    ));
}

#[tokio::test]
async fn unknown_compression_is_rejected() {
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 16)
        .short(TagId::ImageHeight, 16)
        .short(TagId::TileWidth, 16)
        .short(TagId::TileHeight, 16)
        .short(TagId::Compression, 60000)
        .long(TagId::TileOffsets, 0x800)
        .long(TagId::TileByteCounts, 4);
    builder.data_at(0x800, &[0u8; 4]);
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();

    assert!(matches!(
        cog.images()[0].tile(0, 0).await,
        Err(AsyncCogError::UnsupportedCompression(60000))
    ));
}

#[tokio::test]
async fn bigtiff_single_tile() {
    let mut builder = TiffBuilder::big();
    builder
        .ifd()
        .short(TagId::ImageWidth, 16)
        .short(TagId::ImageHeight, 16)
        .short(TagId::TileWidth, 16)
        .short(TagId::TileHeight, 16)
        .long8(TagId::TileOffsets, 0x800)
        .long8(TagId::TileByteCounts, 8);
    builder.data_at(0x800, b"big tile");
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();

    let tile = cog.images()[0].tile(0, 0).await.unwrap().unwrap();
    assert_eq!(&tile.bytes[..], b"big tile");
}

#[tokio::test]
async fn multi_strip_image() {
    let mut builder = TiffBuilder::classic();
    builder
        .ifd()
        .short(TagId::ImageWidth, 8)
        .short(TagId::ImageHeight, 24)
        .long(TagId::RowsPerStrip, 8)
        .longs(TagId::StripOffsets, &[0x400, 0, 0x500])
        .longs(TagId::StripByteCounts, &[3, 0, 4]);
    builder.data_at(0x400, b"one");
    builder.data_at(0x500, b"four");
    let source = Arc::new(MemSource::new(builder.build()));
    let cog = CogReader::open(source).await.unwrap();
    let image = &cog.images()[0];

    assert_eq!(image.strip_count(), 3);
    assert_eq!(&image.strip(0).await.unwrap().unwrap().bytes[..], b"one");
    assert!(image.strip(1).await.unwrap().is_none());
    assert_eq!(&image.strip(2).await.unwrap().unwrap().bytes[..], b"four");
}

#[tokio::test]
async fn tile_offsets_accessor_loads_array() {
    let offsets: Vec<u32> = (0..12).map(|i| 0x1000 + i * 0x100).collect();
    let source = Arc::new(MemSource::new(tiled(&offsets, &[16; 12]).build()));
    let cog = CogReader::open(source).await.unwrap();
    let image = &cog.images()[0];

    assert!(image.value(TagId::TileOffsets).is_none());
    let loaded = image.tile_offsets().await.unwrap().unwrap();
    assert_eq!(loaded.len(), 12);
    assert_eq!(loaded[3], 0x1300);
    assert!(image.tag(TagId::TileOffsets).unwrap().is_loaded());
}
