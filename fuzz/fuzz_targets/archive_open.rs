//! Fuzz target for Archive::open with arbitrary file contents.
//!
//! Opening must either fail cleanly or produce an archive whose bookkeeping
//! is consistent. A successful open is followed by a read of every entry and
//! an add/delete/close cycle, which exercises the rebuilt range map.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use zipweave::{Archive, ArchiveOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let path = dir.path().join("fuzz.zip");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    let options = ArchiveOptions::new()
        .background_compression(false)
        .deterministic(true);
    let Ok(mut archive) = Archive::open_with_options(&path, options) else {
        return;
    };
    assert!(archive.verify_bookkeeping().is_ok());

    let names: Vec<String> = archive
        .names()
        .map(|names| names.into_iter().collect())
        .unwrap_or_default();
    for name in &names {
        let _ = archive.read(name);
    }

    if let Some(first) = names.first() {
        let _ = archive.delete(first);
    }
    let _ = archive.add_bytes("fuzz/added.txt", data, true);
    assert!(archive.verify_bookkeeping().is_ok());
    let _ = archive.close();
});
