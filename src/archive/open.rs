//! Opening archives and rebuilding in-memory state from disk.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use super::{Archive, ArchiveState, Diagnostics, read_at};
use crate::directory::CentralDirectory;
use crate::entry::{EntryId, StoredEntry};
use crate::format::local::truncated;
use crate::format::{
    self, CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, LocalFileHeader,
};
use crate::options::ArchiveOptions;
use crate::range_map::ByteRangeMap;
use crate::task::CompressionPool;
use crate::{Error, Result};

/// State recovered from an existing file.
struct Loaded {
    directory: CentralDirectory,
    map: ByteRangeMap,
    comment: Vec<u8>,
    next_id: u64,
}

impl Archive {
    /// Opens the archive at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails with a format error ([`Error::InvalidFormat`] or
    /// [`Error::CorruptHeader`]) if the file exists but is not a consistent
    /// ZIP archive; no partial view is ever produced.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ArchiveOptions::default())
    }

    /// Opens the archive at `path` with explicit options.
    ///
    /// An empty or missing file (with `create_if_missing`) starts a new
    /// archive, which is written out on close even if nothing is added.
    pub fn open_with_options(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create_if_missing)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file, options)
    }

    /// Creates a new, empty archive at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(path, file, options)
    }

    fn from_file(path: &Path, file: File, options: ArchiveOptions) -> Result<Self> {
        let len = file.metadata()?.len();
        let mut diagnostics = Diagnostics::new();

        let (loaded, dirty) = if len == 0 {
            let loaded = Loaded {
                directory: CentralDirectory::new(),
                map: ByteRangeMap::new(),
                comment: Vec::new(),
                next_id: 0,
            };
            (loaded, true)
        } else {
            (load(&file, len, &mut diagnostics)?, false)
        };

        log::debug!(
            "opened {} ({} bytes, {} entries)",
            path.display(),
            len,
            loaded.directory.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            state: ArchiveState::Open,
            pool: CompressionPool::new(options.worker_threads, options.background_compression),
            rules: options.alignment_rules.clone(),
            options,
            directory: loaded.directory,
            map: loaded.map,
            unmerged: Vec::new(),
            errors: VecDeque::new(),
            observers: Vec::new(),
            comment: loaded.comment,
            extra_block: Vec::new(),
            next_id: loaded.next_id,
            dirty,
            diagnostics,
        })
    }
}

/// Parses the end record, the central directory, and every local header.
///
/// The range map starts with the whole file free; each entry then reserves
/// its local header, data, and data descriptor. The old central directory
/// and anything unreferenced stay free.
fn load(file: &File, len: u64, diagnostics: &mut Diagnostics) -> Result<Loaded> {
    let mut handle = file;
    let located = EndOfCentralDirectory::find(&mut handle, len)?;
    if located.trailing > 0 {
        diagnostics.warn_once("trailing-data", || {
            format!(
                "{} bytes of trailing data after the end of central directory record",
                located.trailing
            )
        });
    }

    let eocd = located.record;
    let cd_offset = u64::from(eocd.cd_offset);
    let cd_bytes = read_at(file, cd_offset, u64::from(eocd.cd_size))
        .map_err(|e| truncated(cd_offset, "central directory", e))?;
    let headers =
        CentralDirectoryHeader::parse_all(&cd_bytes, cd_offset, usize::from(eocd.total_entries))?;

    let mut directory = CentralDirectory::new();
    let mut map = ByteRangeMap::with_len(len);
    let mut next_id = 0;

    for central in headers {
        next_id += 1;
        let id = EntryId::new(next_id);
        let entry = load_entry(file, central, cd_offset, id, diagnostics)?;
        map.reserve(entry.offset(), entry.end(), id)?;
        let name = entry.name().to_string();
        if directory.insert(entry).is_some() {
            return Err(Error::InvalidFormat(format!("duplicate entry name '{}'", name)));
        }
    }

    Ok(Loaded {
        directory,
        map,
        comment: eocd.comment,
        next_id,
    })
}

/// Reads and cross-checks the local header (and data descriptor) of one
/// central directory record.
fn load_entry(
    file: &File,
    central: CentralDirectoryHeader,
    cd_offset: u64,
    id: EntryId,
    diagnostics: &mut Diagnostics,
) -> Result<StoredEntry> {
    let offset = u64::from(central.local_header_offset);
    let display_name = format::decode_name(&central.name);

    if central.flags & format::FLAG_ENCRYPTED != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "encrypted entries",
        });
    }
    if central.disk_start != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }
    if offset + LocalFileHeader::FIXED_SIZE as u64 > cd_offset {
        return Err(Error::corrupt_header(
            offset,
            format!("local header of '{}' overlaps the central directory", display_name),
        ));
    }

    let mut handle = file;
    handle.seek(SeekFrom::Start(offset))?;
    let local = LocalFileHeader::read_from(&mut handle, offset)?;

    if local.name != central.name {
        return Err(Error::corrupt_header(
            offset,
            format!(
                "local name '{}' differs from central name '{}'",
                format::decode_name(&local.name),
                display_name
            ),
        ));
    }
    if local.method != central.method {
        return Err(Error::corrupt_header(
            offset,
            format!("method of '{}' differs between headers", display_name),
        ));
    }
    if !local.has_data_descriptor()
        && (local.crc32 != central.crc32
            || local.compressed_size != central.compressed_size
            || local.uncompressed_size != central.uncompressed_size)
    {
        return Err(Error::corrupt_header(
            offset,
            format!("CRC or sizes of '{}' differ between headers", display_name),
        ));
    }

    let data_end = offset + local.len() + u64::from(central.compressed_size);
    if data_end > cd_offset {
        return Err(Error::corrupt_header(
            offset,
            format!("data of '{}' runs into the central directory", display_name),
        ));
    }

    let descriptor_len = if central.flags & format::FLAG_DATA_DESCRIPTOR != 0 {
        diagnostics.warn_once("data-descriptor", || {
            format!(
                "archive uses data descriptors (first seen on '{}'); they are kept as-is",
                display_name
            )
        });
        let available = (cd_offset - data_end).min(DataDescriptor::SIGNED_SIZE as u64);
        let raw = read_at(file, data_end, available)?;
        let descriptor = DataDescriptor::parse(&raw, data_end)?;
        if descriptor.crc32 != central.crc32
            || descriptor.compressed_size != central.compressed_size
            || descriptor.uncompressed_size != central.uncompressed_size
        {
            return Err(Error::corrupt_header(
                data_end,
                format!("data descriptor of '{}' disagrees with central directory", display_name),
            ));
        }
        descriptor.len()
    } else {
        0
    };

    StoredEntry::from_headers(id, central, &local, descriptor_len)
}
