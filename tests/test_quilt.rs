// tests/test_quilt.rs — Integration tests for view enumeration and quilt
// assembly, run on the in-memory HostBackend.
//
// Every view is a solid colour, so where it landed in the quilt can be read
// straight off the assembled image.

use std::fs;
use std::path::Path;

use quilt_native::backend::host::HostBackend;
use quilt_native::image::{save_png, RgbaBuffer};
use quilt_native::quilt::{AssemblyPolicy, QuiltAssembler, QuiltGrid, QuiltSource};
use quilt_native::views::{InputMode, ViewSet};
use quilt_native::{ComputeBackend, DeviceImage, PipelineError};

fn colour(i: usize) -> [u8; 4] {
    [(i * 40) as u8, 200 - (i * 30) as u8, i as u8, 255]
}

/// Write `count` solid views named 0.png, 1.png, ... into `dir`.
fn write_views(dir: &Path, count: usize, w: u32, h: u32) {
    for i in 0..count {
        save_png(&RgbaBuffer::filled(w, h, colour(i)), &dir.join(format!("{i}.png"))).unwrap();
    }
}

fn views(dir: &Path) -> ViewSet {
    match InputMode::detect(dir).unwrap() {
        InputMode::Directory(v) => v,
        other => panic!("expected a directory, got {other:?}"),
    }
}

// ===== Input mode & enumeration =====

#[test]
fn views_are_sorted_lexicographically() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["2.png", "10.png", "1.png"] {
        save_png(&RgbaBuffer::new(2, 2), &dir.path().join(name)).unwrap();
    }
    fs::create_dir(dir.path().join("nested")).unwrap();

    let set = views(dir.path());
    let names: Vec<String> = set
        .files()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    // "10.png" < "2.png": string order, not numeric. Directories are skipped.
    assert_eq!(names, vec!["1.png", "10.png", "2.png"]);
}

// ===== Grid placement =====

#[test]
fn four_views_fill_2x2_grid() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 4, 100, 100);

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .unwrap();

    assert_eq!(assembled.image.size(), (200, 200));
    assert_eq!(assembled.report.source, QuiltSource::Views);
    assert_eq!(assembled.report.view_size, (100, 100));
    assert_eq!(assembled.report.loaded, 4);
    assert!(!assembled.report.excess_ignored);

    let quilt = backend.read_image(&assembled.image).unwrap();
    // 0.png → cell (0,1), 1.png → (1,1), 2.png → (0,0), 3.png → (1,0)
    assert_eq!(quilt.pixel(0, 100), colour(0));
    assert_eq!(quilt.pixel(199, 199), colour(1));
    assert_eq!(quilt.pixel(50, 50), colour(2));
    assert_eq!(quilt.pixel(100, 0), colour(3));
    assert_eq!(quilt.pixel(199, 99), colour(3));
}

#[test]
fn non_square_grid_places_views_by_formula() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 6, 8, 5);

    let backend = HostBackend::new();
    let grid = QuiltGrid::new(2, 3);
    let assembled = QuiltAssembler::new(&backend, grid)
        .assemble_views(&views(dir.path()))
        .unwrap();
    assert_eq!(assembled.image.size(), (24, 10));

    let quilt = backend.read_image(&assembled.image).unwrap();
    for i in 0..6 {
        let col = (i % 3) as u32;
        let row = 2 - 1 - (i / 3) as u32;
        assert_eq!(quilt.pixel(col * 8 + 3, row * 5 + 2), colour(i), "view {i}");
    }
}

// ===== View count tolerance =====

#[test]
fn one_missing_view_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 3, 10, 10);

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .unwrap();
    assert_eq!(assembled.report.loaded, 3);

    // The last cell, (1,0), stays zero.
    let quilt = backend.read_image(&assembled.image).unwrap();
    assert_eq!(quilt.pixel(15, 5), [0, 0, 0, 0]);
}

#[test]
fn two_missing_views_fail() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 2, 10, 10);

    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    assert!(
        matches!(err, PipelineError::InsufficientViews { found: 2, expected: 4 }),
        "{err}"
    );
}

#[test]
fn five_views_for_2x2_grid_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 5, 100, 100);

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .unwrap();
    assert_eq!(assembled.image.size(), (200, 200));
    assert_eq!(assembled.report.loaded, 5);
    assert!(assembled.report.excess_ignored);

    let quilt = backend.read_image(&assembled.image).unwrap();
    assert_eq!(quilt.pixel(150, 50), colour(3));
}

#[test]
fn enumeration_stops_one_past_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 7, 4, 4);

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .unwrap();
    assert_eq!(assembled.report.loaded, 5);
    assert!(assembled.report.excess_ignored);
}

// ===== Strict policy =====

#[test]
fn strict_rejects_one_missing_view() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 3, 10, 10);

    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .with_policy(AssemblyPolicy::Strict)
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    assert!(
        matches!(err, PipelineError::InsufficientViews { found: 3, expected: 4 }),
        "{err}"
    );
}

#[test]
fn strict_never_decodes_extra_files() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 4, 10, 10);
    // Sorts last and is not an image.
    fs::write(dir.path().join("9-notes.txt"), b"not a png").unwrap();

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .with_policy(AssemblyPolicy::Strict)
        .assemble_views(&views(dir.path()))
        .unwrap();
    assert_eq!(assembled.report.loaded, 4);
    assert!(assembled.report.excess_ignored);
}

#[test]
fn lenient_decodes_the_file_past_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 4, 10, 10);
    fs::write(dir.path().join("9-notes.txt"), b"not a png").unwrap();

    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Decode { .. }), "{err}");
}

// ===== Transfer failures =====

#[test]
fn oversized_view_is_transfer_error() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 4, 10, 10);
    // Replace view 1 (cell (1,1)) with a wider image.
    save_png(&RgbaBuffer::filled(12, 10, colour(1)), &dir.path().join("1.png")).unwrap();

    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    match err {
        PipelineError::Transfer(msg) => assert!(msg.contains("1.png"), "{msg}"),
        other => panic!("expected Transfer, got {other}"),
    }
}

#[test]
fn quilt_exceeding_device_limit_fails_allocation() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 4, 40, 40);

    let backend = HostBackend::with_max_dimension(64);
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Transfer(_)), "{err}");
}

#[test]
fn grid_too_wide_for_the_view_size_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write_views(dir.path(), 1, 100, 100);

    // 50M columns of 100 px do not fit a u32 width.
    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(1, 50_000_000))
        .assemble_views(&views(dir.path()))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Config(_)), "{err}");
}

// ===== Single-file mode =====

#[test]
fn single_quilt_is_uploaded_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quilt.png");
    let mut pixels = RgbaBuffer::filled(30, 20, [9, 9, 9, 255]);
    pixels.set_pixel(29, 19, [1, 2, 3, 4]);
    save_png(&pixels, &path).unwrap();

    let backend = HostBackend::new();
    let assembled = QuiltAssembler::new(&backend, QuiltGrid::new(9, 5))
        .assemble(&InputMode::detect(&path).unwrap())
        .unwrap();
    assert_eq!(assembled.report.source, QuiltSource::File);
    assert_eq!(assembled.image.size(), (30, 20));
    assert_eq!(backend.read_image(&assembled.image).unwrap(), pixels);
}

#[test]
fn undecodable_quilt_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quilt.png");
    fs::write(&path, b"garbage").unwrap();

    let backend = HostBackend::new();
    let err = QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .upload_quilt_file(&path)
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Decode { .. }), "{err}");
}
