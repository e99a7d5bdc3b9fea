//! Round-trip tests: write with zipweave, reopen, and read back with both
//! zipweave and independent readers.

mod common;

use zipweave::{Archive, ArchiveOptions, CompressionMethod, EntryState, Error};

use common::{
    RawEntry, build_raw_archive, create_archive, inline_options, options, read_with_zip, scratch,
    text, unzip_available, unzip_test,
};

// ============================================================================
// Basic add / reopen
// ============================================================================

#[test]
fn test_new_archive_is_valid_when_empty() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    assert!(archive.is_empty().unwrap());
    archive.close().unwrap();

    assert_eq!(std::fs::metadata(&s.path).unwrap().len(), 22);
    assert!(read_with_zip(&s.path).is_empty());
}

#[test]
fn test_stored_and_compressed_round_trip() {
    let s = scratch();
    let big = text(50_000);
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.add_bytes("stored.txt", b"hello world", false).unwrap();
    archive.add_bytes("deflated.txt", &big, true).unwrap();
    archive.add_bytes("empty.bin", b"", true).unwrap();
    archive.close().unwrap();

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    assert_eq!(archive.len().unwrap(), 3);

    let stored = archive.get("stored.txt").unwrap().unwrap();
    assert_eq!(stored.method(), CompressionMethod::Stored);
    let deflated = archive.get("deflated.txt").unwrap().unwrap();
    assert_eq!(deflated.method(), CompressionMethod::Deflate);
    assert!(deflated.compressed_size() < deflated.uncompressed_size());
    assert_eq!(deflated.uncompressed_size(), 50_000);

    assert_eq!(archive.read("stored.txt").unwrap(), b"hello world");
    assert_eq!(archive.read("deflated.txt").unwrap(), big);
    assert_eq!(archive.read("empty.bin").unwrap(), b"");
    archive.verify_bookkeeping().unwrap();
    archive.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0], ("deflated.txt".to_string(), big));
    assert_eq!(contents[1], ("empty.bin".to_string(), Vec::new()));
    assert_eq!(contents[2], ("stored.txt".to_string(), b"hello world".to_vec()));
}

#[test]
fn test_incompressible_data_is_stored() {
    use rand::{Rng, SeedableRng};

    let s = scratch();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let noise: Vec<u8> = (0..4096).map(|_| rng.r#gen()).collect();

    let mut archive = Archive::open_with_options(&s.path, inline_options()).unwrap();
    let entry = archive.add_bytes("noise.bin", &noise, true).unwrap();
    assert_eq!(entry.method(), CompressionMethod::Stored);
    assert_eq!(entry.compressed_size(), 4096);
    archive.close().unwrap();

    assert_eq!(read_with_zip(&s.path)[0].1, noise);
}

#[test]
fn test_add_from_reader() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, inline_options()).unwrap();
    let data = text(3000);
    let entry = archive.add("from_reader.txt", &data[..], true).unwrap();
    assert_eq!(entry.crc32(), crc32fast::hash(&data));
    assert_eq!(entry.state(), EntryState::Ready);
    archive.close().unwrap();

    let mut archive = Archive::open(&s.path).unwrap();
    assert_eq!(archive.read("from_reader.txt").unwrap(), data);
}

#[test]
fn test_utf8_names() {
    let s = scratch();
    create_archive(&s.path, &[("naïve/résumé.txt", b"cv"), ("日本語.txt", b"text")]);

    let archive = Archive::open(&s.path).unwrap();
    let names: Vec<_> = archive.names().unwrap().into_iter().collect();
    assert_eq!(names, ["naïve/résumé.txt", "日本語.txt"]);

    let contents = read_with_zip(&s.path);
    assert_eq!(contents[0].0, "naïve/résumé.txt");
}

#[test]
fn test_directories() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    let dir = archive.add_directory("res/").unwrap();
    assert!(dir.is_directory());
    assert_eq!(dir.compressed_size(), 0);
    archive.add_bytes("res/a.txt", b"a", false).unwrap();

    assert!(matches!(
        archive.add_directory("res"),
        Err(Error::InvalidEntryName(_))
    ));
    assert!(matches!(
        archive.add_bytes("other/", b"data", false),
        Err(Error::InvalidEntryName(_))
    ));
    archive.close().unwrap();

    let archive = Archive::open(&s.path).unwrap();
    assert!(archive.get("res/").unwrap().unwrap().is_directory());
    assert_eq!(archive.len().unwrap(), 2);
}

#[test]
fn test_invalid_names_rejected() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    for name in ["", "/abs", "a//b", "../up", "a\\b", "nul\0byte"] {
        assert!(
            matches!(archive.add_bytes(name, b"x", false), Err(Error::InvalidEntryName(_))),
            "{:?} accepted",
            name
        );
    }
    assert!(archive.is_empty().unwrap());
}

// ============================================================================
// Replace / delete
// ============================================================================

#[test]
fn test_replace_keeps_single_entry() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.add_bytes("a.txt", b"first version", false).unwrap();
    archive.add_bytes("a.txt", b"second", false).unwrap();
    assert_eq!(archive.len().unwrap(), 1);
    assert_eq!(archive.read("a.txt").unwrap(), b"second");
    archive.verify_bookkeeping().unwrap();
    archive.close().unwrap();

    assert_eq!(
        read_with_zip(&s.path),
        vec![("a.txt".to_string(), b"second".to_vec())]
    );
}

#[test]
fn test_delete_is_immediately_invisible() {
    let s = scratch();
    create_archive(&s.path, &[("keep.txt", b"Keep this"), ("delete.txt", b"Delete this")]);

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.delete("delete.txt").unwrap();
    assert!(archive.get("delete.txt").unwrap().is_none());
    assert!(!archive.contains("delete.txt").unwrap());
    assert!(!archive.names().unwrap().contains("delete.txt"));
    assert!(matches!(
        archive.read("delete.txt"),
        Err(Error::EntryNotFound { .. })
    ));
    archive.close().unwrap();

    assert_eq!(
        read_with_zip(&s.path),
        vec![("keep.txt".to_string(), b"Keep this".to_vec())]
    );
}

#[test]
fn test_delete_missing_entry() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    let err = archive.delete("nope.txt").unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { ref name } if name == "nope.txt"));
}

#[test]
fn test_freed_space_is_reused() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.add_bytes("a.bin", &[1u8; 1000], false).unwrap();
    archive.add_bytes("b.bin", &[2u8; 10], false).unwrap();
    archive.delete("a.bin").unwrap();

    let c = archive.add_bytes("c.bin", &[3u8; 500], false).unwrap();
    assert_eq!(c.offset(), 0);
    archive.verify_bookkeeping().unwrap();
    archive.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents[0], ("b.bin".to_string(), vec![2u8; 10]));
    assert_eq!(contents[1], ("c.bin".to_string(), vec![3u8; 500]));
}

#[test]
fn test_delete_then_reopen_shrinks_file() {
    let s = scratch();
    create_archive(&s.path, &[("a.bin", &[1u8; 100]), ("b.bin", &[2u8; 5000])]);
    let before = std::fs::metadata(&s.path).unwrap().len();

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.delete("b.bin").unwrap();
    archive.close().unwrap();

    let after = std::fs::metadata(&s.path).unwrap().len();
    assert!(after < before - 5000, "{} -> {}", before, after);
    assert_eq!(read_with_zip(&s.path).len(), 1);
}

// ============================================================================
// Comment, compaction, merge
// ============================================================================

#[test]
fn test_archive_comment() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.add_bytes("a.txt", b"a", false).unwrap();
    archive.set_comment("built by test").unwrap();
    archive.close().unwrap();

    let mut archive = Archive::open(&s.path).unwrap();
    assert_eq!(archive.comment().unwrap(), b"built by test");
    assert!(matches!(
        archive.set_comment(vec![b'x'; 70_000]),
        Err(Error::InvalidFormat(_))
    ));
    archive.set_comment("").unwrap();
    archive.close().unwrap();

    let archive = Archive::open(&s.path).unwrap();
    assert!(archive.comment().unwrap().is_empty());
}

#[test]
fn test_compact_closes_gaps() {
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    archive.add_bytes("a.bin", &[1u8; 2000], false).unwrap();
    archive.add_bytes("b.bin", &[2u8; 300], false).unwrap();
    archive.add_bytes("c.bin", &[3u8; 2000], false).unwrap();
    archive.add_bytes("d.bin", &[4u8; 300], false).unwrap();
    archive.delete("a.bin").unwrap();
    archive.delete("c.bin").unwrap();

    assert!(archive.compact().unwrap());
    archive.verify_bookkeeping().unwrap();
    assert_eq!(archive.range_map().unwrap().free_bytes(), 0);
    assert_eq!(archive.get("b.bin").unwrap().unwrap().offset(), 0);
    assert_eq!(archive.read("d.bin").unwrap(), vec![4u8; 300]);
    assert!(!archive.compact().unwrap());
    archive.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[1], ("d.bin".to_string(), vec![4u8; 300]));
}

#[test]
fn test_compact_on_close_keeps_alignment() {
    let s = scratch();
    let opts = options()
        .alignment_rule(zipweave::AlignmentRule::suffix(".so", 4096).unwrap())
        .compact_on_close(true);
    let mut archive = Archive::open_with_options(&s.path, opts.clone()).unwrap();
    archive.add_bytes("junk.bin", &[9u8; 10_000], false).unwrap();
    archive.add_bytes("lib/libx.so", &[5u8; 100], false).unwrap();
    archive.delete("junk.bin").unwrap();
    archive.close().unwrap();

    let archive = Archive::open_with_options(&s.path, opts).unwrap();
    let so = archive.get("lib/libx.so").unwrap().unwrap();
    assert_eq!(so.data_offset(), 4096);
}

#[test]
fn test_merge_from_copies_raw_data() {
    let s = scratch();
    let src_path = s.dir.path().join("source.zip");
    let big = text(20_000);

    let mut source = Archive::open_with_options(&src_path, options()).unwrap();
    source.add_bytes("a.txt", &big, true).unwrap();
    source.add_bytes("b.txt", b"bee", false).unwrap();
    source.add_bytes("skip.txt", b"skip", false).unwrap();

    let mut target = Archive::open_with_options(&s.path, options()).unwrap();
    target.add_bytes("b.txt", b"old bee", false).unwrap();

    let copied = target
        .merge_from(&mut source, |e| e.name() != "skip.txt")
        .unwrap();
    assert_eq!(copied, 2);

    let a = target.get("a.txt").unwrap().unwrap();
    assert_eq!(a.method(), CompressionMethod::Deflate);
    assert_eq!(target.read("a.txt").unwrap(), big);
    assert_eq!(target.read("b.txt").unwrap(), b"bee");
    assert!(target.get("skip.txt").unwrap().is_none());
    target.verify_bookkeeping().unwrap();
    target.close().unwrap();
    source.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0].1, big);
}

// ============================================================================
// Existing archives from other writers
// ============================================================================

#[test]
fn test_open_zip_crate_archive() {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let s = scratch();
    {
        let file = std::fs::File::create(&s.path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("hello.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&text(5000)).unwrap();
        writer
            .start_file(
                "raw.bin",
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored),
            )
            .unwrap();
        writer.write_all(b"raw").unwrap();
        writer.finish().unwrap();
    }

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    assert_eq!(archive.read("hello.txt").unwrap(), text(5000));
    assert_eq!(archive.read("raw.bin").unwrap(), b"raw");
    archive.add_bytes("new.txt", b"new", true).unwrap();
    archive.delete("raw.bin").unwrap();
    archive.verify_bookkeeping().unwrap();
    archive.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0], ("hello.txt".to_string(), text(5000)));
    assert_eq!(contents[1], ("new.txt".to_string(), b"new".to_vec()));
}

#[test]
fn test_data_descriptor_entries() {
    let s = scratch();
    let bytes = build_raw_archive(
        &[
            RawEntry::with_descriptor("signed.txt", b"signed data", true),
            RawEntry::with_descriptor("unsigned.txt", b"unsigned data", false),
            RawEntry::stored("plain.txt", b"plain"),
        ],
        b"",
    );
    std::fs::write(&s.path, bytes).unwrap();

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    assert!(archive.diagnostics().has_warned("data-descriptor"));
    assert_eq!(archive.diagnostics().warnings().len(), 1);

    let signed = archive.get("signed.txt").unwrap().unwrap();
    assert!(signed.has_data_descriptor());
    assert_eq!(signed.end() - signed.data_offset(), 11 + 16);
    let unsigned = archive.get("unsigned.txt").unwrap().unwrap();
    assert_eq!(unsigned.end() - unsigned.data_offset(), 13 + 12);

    assert_eq!(archive.read("signed.txt").unwrap(), b"signed data");
    assert_eq!(archive.read("unsigned.txt").unwrap(), b"unsigned data");
    archive.verify_bookkeeping().unwrap();

    archive.delete("plain.txt").unwrap();
    archive.close().unwrap();

    let contents = read_with_zip(&s.path);
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0], ("signed.txt".to_string(), b"signed data".to_vec()));
}

#[test]
fn test_trailing_data_is_tolerated() {
    let s = scratch();
    let mut bytes = build_raw_archive(&[RawEntry::stored("a.txt", b"a")], b"");
    bytes.extend_from_slice(b"garbage after the end");
    std::fs::write(&s.path, bytes).unwrap();

    let mut archive = Archive::open_with_options(&s.path, options()).unwrap();
    assert!(archive.diagnostics().has_warned("trailing-data"));
    assert_eq!(archive.read("a.txt").unwrap(), b"a");
}

#[test]
fn test_unmodified_archive_is_untouched() {
    let s = scratch();
    create_archive(&s.path, &[("a.txt", b"a"), ("b.txt", b"b")]);
    let before = std::fs::read(&s.path).unwrap();

    let mut archive = Archive::open(&s.path).unwrap();
    assert!(!archive.is_dirty());
    assert_eq!(archive.read("a.txt").unwrap(), b"a");
    archive.close().unwrap();

    assert_eq!(std::fs::read(&s.path).unwrap(), before);
}

#[test]
fn test_deterministic_output() {
    let s = scratch();
    let other = s.dir.path().join("other.zip");
    for path in [&s.path, &other] {
        let opts = ArchiveOptions::new().deterministic(true);
        let mut archive = Archive::open_with_options(path, opts).unwrap();
        archive.add_bytes("a.txt", &text(10_000), true).unwrap();
        archive.finish_all_background_tasks().unwrap();
        archive.add_bytes("b.txt", b"b", false).unwrap();
        archive.close().unwrap();
    }
    assert_eq!(std::fs::read(&s.path).unwrap(), std::fs::read(&other).unwrap());
}

#[test]
fn test_unzip_accepts_output() {
    if !unzip_available() {
        return;
    }
    let s = scratch();
    let mut archive = Archive::open_with_options(&s.path, inline_options()).unwrap();
    archive.add_bytes("a.txt", &text(10_000), true).unwrap();
    archive.add_bytes("b.txt", b"b", false).unwrap();
    archive.add_bytes("c.txt", b"c", false).unwrap();
    archive.delete("c.txt").unwrap();
    archive.close().unwrap();

    assert!(unzip_test(&s.path));
}
