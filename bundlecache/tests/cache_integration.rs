//! Integration tests for the tile cache.
//!
//! These tests build synthetic cache trees on disk and verify:
//! - Discovery across container, level, and flat layouts
//! - End-to-end tile reads through the public API
//! - Block boundary resolution across bundles
//! - Concurrent readers sharing one cache
//!
//! Run with: `cargo test --test cache_integration`

use std::path::Path;
use std::sync::Arc;

use bundlecache::index::{encode_record, INDEX_FILE_LEN, INDEX_HEADER_LEN, INDEX_RECORD_LEN};
use bundlecache::{
    build_cache, build_cache_with_config, CacheConfig, ErrorKind, Level, SlotOrder, TileCoord,
    TileLookup, PNG_SIGNATURE,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

/// Build a PNG-like payload: signature plus a marker byte sequence.
fn payload(marker: u32) -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(&marker.to_le_bytes());
    bytes
}

/// Write a bundle pair whose tiles are given as `(local_row, local_col, bytes)`.
///
/// Slots are laid out column-major. Each record is written as a 4-byte length
/// prefix followed by the payload; the index points at the payload.
fn write_bundle(dir: &Path, name: &str, tiles: &[(u32, u32, Vec<u8>)]) {
    std::fs::create_dir_all(dir).unwrap();

    let mut index = vec![0u8; INDEX_FILE_LEN];
    // Leading bytes stand in for a bundle header.
    let mut data = vec![0u8; 60];

    for (row, col, bytes) in tiles {
        data.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);

        let slot = (*col * 128 + *row) as usize;
        let start = INDEX_HEADER_LEN + slot * INDEX_RECORD_LEN;
        index[start..start + INDEX_RECORD_LEN].copy_from_slice(&encode_record(offset));
    }

    std::fs::write(dir.join(format!("{}.bundlx", name)), index).unwrap();
    std::fs::write(dir.join(format!("{}.bundle", name)), data).unwrap();
}

/// A three-level tree in an ArcGIS-style `_alllayers` container.
fn build_sample_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let layers = temp.path().join("Layers").join("_alllayers");

    write_bundle(&layers.join("L00"), "R0000C0000", &[(0, 0, payload(1))]);

    write_bundle(
        &layers.join("L01"),
        "R0000C0000",
        &[(0, 0, payload(10)), (127, 127, payload(11))],
    );
    write_bundle(&layers.join("L01"), "R0080C0080", &[(0, 0, payload(12))]);

    write_bundle(
        &layers.join("L12"),
        "R0480C0380",
        &[(5, 9, payload(120)), (64, 1, payload(121))],
    );

    temp
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_discovers_all_levels() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();

    let levels: Vec<String> = cache.levels().iter().map(|l| l.to_string()).collect();
    assert_eq!(levels, vec!["L00", "L01", "L12"]);
    assert_eq!(cache.bundle_count(), 4);
}

#[test]
fn test_reads_stored_tiles() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();

    let cases = [
        (0, 0, 0, 1),
        (1, 0, 0, 10),
        (1, 127, 127, 11),
        (1, 128, 128, 12),
        (12, 0x480 + 5, 0x380 + 9, 120),
        (12, 0x480 + 64, 0x380 + 1, 121),
    ];

    for (level, row, col, marker) in cases {
        let tile = cache.get_tile(level, row, col).unwrap();
        assert_eq!(
            tile,
            TileLookup::Found(payload(marker).into()),
            "tile {}/{}/{}",
            level,
            row,
            col
        );
    }
}

#[test]
fn test_every_result_is_png_absent_or_named_error() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();

    for level in [0, 1, 2, 12] {
        for row in (0..400).step_by(37) {
            for col in (0..400).step_by(41) {
                match cache.get_tile(level, row, col) {
                    Ok(TileLookup::Found(bytes)) => assert!(bytes.starts_with(&PNG_SIGNATURE)),
                    Ok(TileLookup::Absent) => {}
                    Err(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
                }
            }
        }
    }
}

#[test]
fn test_block_boundary() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();

    let last = TileCoord::new(1, 127, 127).unwrap();
    let next = TileCoord::new(1, 128, 128).unwrap();

    let last_bundle = cache.bundle_for(&last).unwrap().unwrap();
    let next_bundle = cache.bundle_for(&next).unwrap().unwrap();
    assert_ne!(last_bundle.origin(), next_bundle.origin());

    // Past the only bundle of level 0: no bundle at all.
    let beyond = TileCoord::new(0, 128, 128).unwrap();
    assert!(cache.bundle_for(&beyond).unwrap().is_none());
    assert!(cache.get(&beyond).unwrap().is_absent());
}

#[test]
fn test_origin_lookup_is_idempotent() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();
    let catalog = cache.catalog(Level::new(12).unwrap()).unwrap();

    let by_origin = catalog.find_bundle(0x480, 0x380).unwrap().origin();
    for row in (0x480..0x480 + 128).step_by(9) {
        for col in (0x380..0x380 + 128).step_by(11) {
            assert_eq!(catalog.find_bundle(row, col).unwrap().origin(), by_origin);
        }
    }
}

#[test]
fn test_reference_fixture_slot_mapping() {
    // Reference layout: 96 filler bytes, length 8 at 96, PNG blob at 100.
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("L00");
    std::fs::create_dir_all(&dir).unwrap();

    let (row, col) = (17u32, 42u32);
    let slot = (col * 128 + row) as usize;

    let mut index = vec![0u8; INDEX_FILE_LEN];
    let start = INDEX_HEADER_LEN + slot * INDEX_RECORD_LEN;
    index[start..start + INDEX_RECORD_LEN].copy_from_slice(&encode_record(100));
    std::fs::write(dir.join("R0000C0000.bundlx"), index).unwrap();

    let mut data = vec![0xAAu8; 96];
    data.extend_from_slice(&8i32.to_le_bytes());
    data.extend_from_slice(&PNG_SIGNATURE);
    std::fs::write(dir.join("R0000C0000.bundle"), data).unwrap();

    let cache = build_cache(temp.path()).unwrap();
    let tile = cache.get_tile(0, row as i64, col as i64).unwrap();
    assert_eq!(tile.bytes().map(|b| &b[..]), Some(&PNG_SIGNATURE[..]));

    let mut found = 0;
    for r in 0..128 {
        for c in 0..128 {
            if cache.get_tile(0, r, c).unwrap().is_found() {
                found += 1;
            }
        }
    }
    assert_eq!(found, 1);

    let transposed = build_cache_with_config(
        temp.path(),
        CacheConfig::default().with_slot_order(SlotOrder::RowMajor),
    )
    .unwrap();
    assert!(transposed
        .get_tile(0, row as i64, col as i64)
        .unwrap()
        .is_absent());
    assert!(transposed
        .get_tile(0, col as i64, row as i64)
        .unwrap()
        .is_found());
}

#[test]
fn test_extract_all_from_bundle() {
    let temp = build_sample_tree();
    let cache = build_cache(temp.path()).unwrap();

    let bundle = cache
        .bundle_for(&TileCoord::new(12, 0x480, 0x380).unwrap())
        .unwrap()
        .unwrap();

    let tiles = bundle.extract_all().unwrap();
    assert_eq!(tiles.len(), 2);
    for (_, result) in &tiles {
        assert!(result.as_ref().unwrap().starts_with(&PNG_SIGNATURE));
    }
}

#[test]
fn test_config_file_drives_build() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tiles").join("L03");
    std::fs::create_dir_all(&dir).unwrap();
    write_bundle(&dir, "R0000C0000", &[(1, 2, payload(3))]);
    std::fs::rename(dir.join("R0000C0000.bundlx"), dir.join("R0000C0000.idx")).unwrap();
    std::fs::rename(dir.join("R0000C0000.bundle"), dir.join("R0000C0000.dat")).unwrap();

    let ini = temp.path().join("cache.ini");
    std::fs::write(
        &ini,
        "[cache]\nbundle_extension = dat\nindex_extension = idx\ncontainer_dirs = tiles\n",
    )
    .unwrap();

    let config = CacheConfig::from_ini_file(&ini).unwrap();
    let cache = build_cache_with_config(temp.path(), config).unwrap();
    assert!(cache.get_tile(3, 1, 2).unwrap().is_found());
}

#[test]
fn test_concurrent_readers_share_cache() {
    let temp = build_sample_tree();
    let cache = Arc::new(build_cache(temp.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let tile = cache.get_tile(1, 127, 127).unwrap();
                    assert_eq!(tile, TileLookup::Found(payload(11).into()));

                    let absent = cache.get_tile(1, (worker * 7 + i) % 64 + 1, 3).unwrap();
                    assert!(absent.is_absent());

                    assert_eq!(
                        cache.get_tile(7, 0, 0).unwrap_err().kind(),
                        ErrorKind::NotFound
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Failed lookups leave the cache usable.
    assert!(cache.get_tile(0, 0, 0).unwrap().is_found());
}

#[test]
fn test_flat_layout_and_summary() {
    let temp = TempDir::new().unwrap();
    write_bundle(temp.path(), "L07_R0000C0080", &[(3, 4, payload(70))]);
    write_bundle(temp.path(), "L07_R0080C0080", &[(0, 0, payload(71))]);
    // No level designator: skipped, not fatal.
    write_bundle(&temp.path().join("misc"), "R0000C0000", &[(0, 0, payload(0))]);

    let cache = build_cache(temp.path()).unwrap();
    assert!(cache.get_tile(7, 3, 0x80 + 4).unwrap().is_found());
    assert!(cache.contains_tile(7, 0x80, 0x80).unwrap());
    assert!(!cache.contains_tile(7, 0x81, 0x80).unwrap());

    let bundle = cache
        .bundle_for(&TileCoord::new(7, 0, 0x80).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(bundle.stored_tiles().unwrap().len(), 1);

    let summary = cache.summary();
    assert_eq!(summary.levels.len(), 1);
    assert_eq!(summary.bundles, 2);
    assert_eq!(summary.skipped, 1);

    let coverage = summary.levels[0].coverage.unwrap();
    assert_eq!(coverage.min.to_string(), "R0000C0080");
    assert_eq!(coverage.max.to_string(), "R0080C0080");
}

#[test]
fn test_upper_case_extensions_build() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("L00");
    write_bundle(&dir, "R0000C0000", &[(0, 0, payload(5))]);
    std::fs::rename(dir.join("R0000C0000.bundlx"), dir.join("R0000C0000.BUNDLX")).unwrap();
    std::fs::rename(dir.join("R0000C0000.bundle"), dir.join("R0000C0000.BUNDLE")).unwrap();

    let cache = build_cache(temp.path()).unwrap();
    assert_eq!(
        cache.get_tile(0, 0, 0).unwrap(),
        TileLookup::Found(payload(5).into())
    );
}

#[test]
fn test_nonexistent_root() {
    let err = build_cache("/nonexistent/bundle/cache").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}
