//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use zipweave::format::{CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader};
use zipweave::{Archive, ArchiveOptions, DosDateTime};

/// A scratch directory holding one archive path that does not exist yet.
pub struct Scratch {
    pub dir: TempDir,
    pub path: PathBuf,
}

/// Creates a fresh scratch directory with `test.zip` as the archive path.
pub fn scratch() -> Scratch {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.zip");
    Scratch { dir, path }
}

/// Options producing reproducible archives with valid DOS timestamps.
pub fn options() -> ArchiveOptions {
    ArchiveOptions::new().timestamp(DosDateTime::MIN)
}

/// Options that run compression inline on the calling thread.
pub fn inline_options() -> ArchiveOptions {
    options().background_compression(false)
}

/// Creates an archive containing `entries`, all stored, and closes it.
pub fn create_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let mut archive = Archive::open_with_options(path, options()).unwrap();
    for (name, data) in entries {
        archive.add_bytes(name, data, false).unwrap();
    }
    archive.close().unwrap();
}

/// Reads `len` bytes of the file at `offset`.
pub fn read_segment(path: &Path, offset: u64, len: usize) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    let start = offset as usize;
    bytes[start..start + len].to_vec()
}

/// Lists `(name, contents)` of every entry as seen by the `zip` crate.
pub fn read_with_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut contents = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        contents.push((file.name().to_string(), data));
    }
    contents.sort();
    contents
}

/// Returns `true` if the system `unzip` tool is installed.
pub fn unzip_available() -> bool {
    Path::new("/usr/bin/unzip").exists()
}

/// Runs `unzip -t` on the archive and returns whether it reported no errors.
pub fn unzip_test(path: &Path) -> bool {
    Command::new("/usr/bin/unzip")
        .arg("-t")
        .arg(path)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// One entry of a hand-built archive.
pub struct RawEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    /// Write sizes and CRC in a trailing data descriptor instead of the
    /// local header.
    pub descriptor: bool,
    /// Include the optional descriptor signature.
    pub signed_descriptor: bool,
}

impl<'a> RawEntry<'a> {
    pub fn stored(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            descriptor: false,
            signed_descriptor: false,
        }
    }

    pub fn with_descriptor(name: &'a str, data: &'a [u8], signed: bool) -> Self {
        Self {
            name,
            data,
            descriptor: true,
            signed_descriptor: signed,
        }
    }
}

/// Builds a stored-only archive byte by byte, the way a streaming writer
/// would lay it out.
pub fn build_raw_archive(entries: &[RawEntry<'_>], comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let crc = crc32fast::hash(entry.data);
        let size = entry.data.len() as u32;
        let flags = if entry.descriptor { 0x0008 } else { 0 };
        let offset = out.len() as u32;

        let local = LocalFileHeader {
            version_needed: 10,
            flags,
            method: 0,
            modified: DosDateTime::MIN,
            crc32: if entry.descriptor { 0 } else { crc },
            compressed_size: if entry.descriptor { 0 } else { size },
            uncompressed_size: if entry.descriptor { 0 } else { size },
            name: entry.name.as_bytes().to_vec(),
            extra: Vec::new(),
        };
        local.write_to(&mut out).unwrap();
        out.extend_from_slice(entry.data);

        if entry.descriptor {
            if entry.signed_descriptor {
                out.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
            }
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }

        central.push(CentralDirectoryHeader {
            version_made_by: 20,
            version_needed: 10,
            flags,
            method: 0,
            modified: DosDateTime::MIN,
            crc32: crc,
            compressed_size: size,
            uncompressed_size: size,
            disk_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            local_header_offset: offset,
            name: entry.name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        });
    }

    let cd_offset = out.len() as u32;
    for header in &central {
        header.write_to(&mut out).unwrap();
    }
    let cd_size = out.len() as u32 - cd_offset;
    EndOfCentralDirectory::new(central.len() as u16, cd_size, cd_offset, comment.to_vec())
        .write_to(&mut out)
        .unwrap();
    out
}

/// Compressible text of roughly `len` bytes.
pub fn text(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}
