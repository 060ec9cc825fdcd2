// tests/test_warnings.rs — Warning-level log output of quilt assembly.
//
// Installs a recording `log::Log` for this test binary. Kept in its own file
// (one test) so no concurrently running test can add records.

use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use quilt_native::backend::host::HostBackend;
use quilt_native::image::{save_png, RgbaBuffer};
use quilt_native::quilt::{QuiltAssembler, QuiltGrid};
use quilt_native::views::ViewSet;

struct Recorder(Mutex<Vec<(Level, String)>>);

impl Log for Recorder {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = self.0.lock() {
            records.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static RECORDER: Recorder = Recorder(Mutex::new(Vec::new()));

/// Drain the recorded warnings.
fn take_warnings() -> Vec<String> {
    let mut records = RECORDER.0.lock().unwrap();
    records
        .drain(..)
        .filter(|(level, _)| *level == Level::Warn)
        .map(|(_, msg)| msg)
        .collect()
}

fn assemble(dir: &Path, count: usize) {
    for i in 0..count {
        let path = dir.join(format!("{i}.png"));
        save_png(&RgbaBuffer::filled(10, 10, [i as u8, 0, 0, 255]), &path).unwrap();
    }
    let backend = HostBackend::new();
    QuiltAssembler::new(&backend, QuiltGrid::new(2, 2))
        .assemble_views(&ViewSet::scan(dir).unwrap())
        .unwrap();
}

#[test]
fn excess_views_emit_exactly_one_warning() {
    log::set_logger(&RECORDER).unwrap();
    log::set_max_level(LevelFilter::Debug);

    // A full grid: nothing to warn about.
    let full = tempfile::tempdir().unwrap();
    assemble(full.path(), 4);
    assert!(take_warnings().is_empty());

    // One view too many: a single warning naming the grid capacity.
    let excess = tempfile::tempdir().unwrap();
    assemble(excess.path(), 5);
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("higher than the expected quilt size"), "{}", warnings[0]);
    assert!(warnings[0].contains("first 4 files"), "{}", warnings[0]);

    // One view short: accepted, with its own warning.
    let short = tempfile::tempdir().unwrap();
    assemble(short.path(), 3);
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("3 of 4 views"), "{}", warnings[0]);
}
