//! Fuzz target for EntryName::new with arbitrary string input.
//!
//! Run with: cargo +nightly fuzz run entry_name
//!
//! Accepted names must never be absolute, contain `..` or `.` segments,
//! backslashes, NUL bytes, or empty segments.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(name) = zipweave::EntryName::new(s) else {
        return;
    };

    let name = name.as_str();
    assert_eq!(name, s);
    assert!(!name.is_empty());
    assert!(!name.starts_with('/'));
    assert!(!name.contains('\\'));
    assert!(!name.contains('\0'));

    let body = name.strip_suffix('/').unwrap_or(name);
    for segment in body.split('/') {
        assert!(!segment.is_empty(), "empty segment in {:?}", name);
        assert!(segment != "." && segment != "..", "dot segment in {:?}", name);
    }
});
