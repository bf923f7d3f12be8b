//! Reading Respawn VPK archives.

use std::cell::RefCell;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::pak::revpk::format::{
    EntryRecord, VPKHeaderRespawn, MAX_CHUNK_LOGICAL, MAX_CHUNK_STORED, MAX_ENTRY_UNCOMPRESSED,
    VPK_HEADER_LEN_RESPAWN,
};
use crate::pak::revpk::tree;
use crate::pak::{ArchiveReader, Error, Result};
use crate::util::file::VPKFileReader;
use crate::util::lzham::{self, LzhamError};
use crate::util::path::{clean_entry_path, find_side_archive_path};

/// Copy window used when streaming entry bytes to disk. Deliberately heap
/// allocated; extraction commonly runs on worker threads with small stacks.
const STREAM_WINDOW: usize = 256 * 1024;

/// Per-entry metadata surfaced by [`Reader::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySummary {
    /// CRC32 of the entry's logical bytes.
    pub crc32: u32,
    /// Total logical size: preload bytes plus uncompressed chunk bytes.
    pub logical_length: u64,
    /// Archive index of the entry's first chunk (999 marks the patch
    /// archive). Zero for chunkless entries.
    pub archive_index: u16,
}

/// A parsed Respawn VPK dir archive.
///
/// Opening parses the directory tree into memory; entry payloads are read
/// from the side archives on demand. Entries are immutable after open.
pub struct Reader {
    dir_path: PathBuf,
    header: VPKHeaderRespawn,
    entries: HashMap<String, EntryRecord>,
    last_error: RefCell<String>,
}

/// An open side archive plus its size, cached for the duration of a single
/// read or extract call.
struct ArchiveHandle {
    path: PathBuf,
    file: File,
    len: u64,
}

impl Reader {
    /// Opens a dir archive and parses its directory tree.
    ///
    /// The filename is not consulted; only the header decides whether this
    /// is a Respawn VPK (Titanfall 2 names its dir archives `*_000.vpk`
    /// rather than `*_dir.vpk`).
    ///
    /// # Errors
    /// - When the file cannot be opened or is truncated
    /// - When the header signature or version does not match
    /// - When the directory tree is corrupt
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(Error::Io)?;

        let header = VPKHeaderRespawn::read_from(&mut file)?;

        let tree_bytes = file
            .read_bytes(header.tree_length as usize)
            .map_err(|e| Error::Util {
                source: e,
                context: "failed to read directory tree".to_string(),
            })?;

        let parsed = tree::parse(&tree_bytes, VPK_HEADER_LEN_RESPAWN as u64)?;

        let mut entries = HashMap::with_capacity(parsed.len());
        for (entry_path, record) in parsed {
            entries.insert(clean_entry_path(&entry_path), record);
        }

        log::debug!(
            "opened {} (v{}.{}, {} entries)",
            path.display(),
            header.major_version,
            header.minor_version,
            entries.len()
        );

        Ok(Self {
            dir_path: path.to_path_buf(),
            header,
            entries,
            last_error: RefCell::new(String::new()),
        })
    }

    /// Path of the dir archive this reader was opened from.
    #[must_use]
    pub fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    /// The validated archive header.
    #[must_use]
    pub fn header(&self) -> &VPKHeaderRespawn {
        &self.header
    }

    /// Number of entries in the archive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(path, summary)` for every entry. Order is
    /// unspecified.
    pub fn entries(&self) -> impl Iterator<Item = (&str, EntrySummary)> + '_ {
        self.entries.iter().map(|(path, record)| {
            (
                path.as_str(),
                EntrySummary {
                    crc32: record.crc32,
                    logical_length: record.total_logical_length(),
                    archive_index: record.chunks.first().map_or(0, |c| c.archive_index),
                },
            )
        })
    }

    /// The parsed record for an entry, if present.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<&EntryRecord> {
        self.entries.get(&clean_entry_path(path))
    }

    /// Human-readable reason for the most recent failed read or extract.
    /// Cleared by every successful call.
    #[must_use]
    pub fn last_error(&self) -> String {
        self.last_error.borrow().clone()
    }

    /// Reads an entry fully into memory.
    ///
    /// # Errors
    /// - [`Error::EntryNotFound`] when the path is not in the tree
    /// - [`Error::PartTooLarge`] / [`Error::EntryTooLarge`] when metadata
    ///   exceeds the sanity limits
    /// - [`Error::ArchiveRead`] when a side archive is missing, too short,
    ///   or unreadable
    /// - [`Error::Decompress`] / [`Error::LzhamUnsupported`] for compressed
    ///   chunks
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.finish(self.read_inner(path))
    }

    /// Streams an entry to `destination` in bounded windows, creating
    /// parent directories as needed. Intended for entries too large to
    /// materialize with [`Reader::read`]; compressed chunks are still
    /// decompressed in memory one chunk at a time.
    ///
    /// # Errors
    /// Same conditions as [`Reader::read`], plus output I/O failures.
    pub fn extract_to<P: AsRef<Path>>(&self, path: &str, destination: P) -> Result<()> {
        self.finish(self.extract_inner(path, destination.as_ref()))
    }

    /// Records the outcome in `last_error` and passes it through.
    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error.borrow_mut().clear(),
            Err(e) => *self.last_error.borrow_mut() = e.to_string(),
        }
        result
    }

    fn lookup(&self, path: &str) -> Result<&EntryRecord> {
        let clean = clean_entry_path(path);
        match self.entries.get(&clean) {
            Some(record) => Ok(record),
            None => Err(Error::EntryNotFound(clean)),
        }
    }

    /// Enforces the sanity limits and returns the entry's total logical
    /// size.
    fn check_limits(record: &EntryRecord) -> Result<u64> {
        let mut total = u64::from(record.preload_bytes);
        for chunk in &record.chunks {
            total = total.saturating_add(chunk.logical_length);
            if total > MAX_ENTRY_UNCOMPRESSED {
                return Err(Error::EntryTooLarge);
            }
            if chunk.stored_length > MAX_CHUNK_STORED {
                return Err(Error::PartTooLarge("compressed"));
            }
            if chunk.logical_length > MAX_CHUNK_LOGICAL {
                return Err(Error::PartTooLarge("uncompressed"));
            }
        }
        Ok(total)
    }

    fn open_archive<'a>(
        &self,
        handles: &'a mut HashMap<u16, ArchiveHandle>,
        archive_index: u16,
    ) -> Result<&'a mut ArchiveHandle> {
        match handles.entry(archive_index) {
            MapEntry::Occupied(occupied) => Ok(occupied.into_mut()),
            MapEntry::Vacant(vacant) => {
                let path = find_side_archive_path(&self.dir_path, archive_index);
                let file = File::open(&path).map_err(|_| Error::ArchiveRead(path.clone()))?;
                let len = file
                    .metadata()
                    .map_err(|_| Error::ArchiveRead(path.clone()))?
                    .len();
                Ok(vacant.insert(ArchiveHandle { path, file, len }))
            }
        }
    }

    fn read_inner(&self, path: &str) -> Result<Vec<u8>> {
        let record = self.lookup(path)?;
        let total = Self::check_limits(record)?;

        let mut out = Vec::with_capacity(total as usize);
        let mut handles: HashMap<u16, ArchiveHandle> = HashMap::new();

        if record.preload_bytes > 0 {
            out.extend_from_slice(&self.read_preload(record)?);
        }

        for chunk in &record.chunks {
            if chunk.logical_length == 0 {
                continue;
            }

            let handle = self.open_archive(&mut handles, chunk.archive_index)?;
            let stored = read_range(handle, chunk.offset, chunk.stored_length as usize)?;

            if chunk.is_compressed() {
                let decompressed = lzham::decompress(&stored, chunk.logical_length as usize)
                    .map_err(|e| match e {
                        LzhamError::Unsupported => Error::LzhamUnsupported,
                        LzhamError::Failed => Error::Decompress(chunk.archive_index),
                    })?;
                out.extend_from_slice(&decompressed);
            } else {
                out.extend_from_slice(&stored);
            }
        }

        Ok(out)
    }

    fn extract_inner(&self, path: &str, destination: &Path) -> Result<()> {
        let record = self.lookup(path)?;
        Self::check_limits(record)?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let mut out = File::create(destination).map_err(Error::Io)?;

        let mut handles: HashMap<u16, ArchiveHandle> = HashMap::new();

        if record.preload_bytes > 0 {
            let file = File::open(&self.dir_path).map_err(|_| Error::PreloadRead)?;
            let len = file.metadata().map_err(|_| Error::PreloadRead)?.len();
            let mut handle = ArchiveHandle {
                path: self.dir_path.clone(),
                file,
                len,
            };
            stream_range(
                &mut handle,
                record.preload_offset,
                u64::from(record.preload_bytes),
                &mut out,
            )
            .map_err(|e| match e {
                Error::ArchiveRead(_) => Error::PreloadRead,
                other => other,
            })?;
        }

        for chunk in &record.chunks {
            if chunk.logical_length == 0 {
                continue;
            }

            let handle = self.open_archive(&mut handles, chunk.archive_index)?;

            if chunk.is_compressed() {
                // Compressed chunks still need contiguous input and output
                // for LZHAM; chunks are small (1 MiB splits), the entry as a
                // whole is what must not be materialized.
                let stored = read_range(handle, chunk.offset, chunk.stored_length as usize)?;
                let decompressed = lzham::decompress(&stored, chunk.logical_length as usize)
                    .map_err(|e| match e {
                        LzhamError::Unsupported => Error::LzhamUnsupported,
                        LzhamError::Failed => Error::Decompress(chunk.archive_index),
                    })?;
                out.write_all(&decompressed).map_err(Error::Io)?;
            } else {
                stream_range(handle, chunk.offset, chunk.stored_length, &mut out)?;
            }
        }

        Ok(())
    }

    fn read_preload(&self, record: &EntryRecord) -> Result<Vec<u8>> {
        let file = File::open(&self.dir_path).map_err(|_| Error::PreloadRead)?;
        let len = file.metadata().map_err(|_| Error::PreloadRead)?.len();
        let mut handle = ArchiveHandle {
            path: self.dir_path.clone(),
            file,
            len,
        };
        read_range(
            &mut handle,
            record.preload_offset,
            usize::from(record.preload_bytes),
        )
        .map_err(|_| Error::PreloadRead)
    }
}

impl ArchiveReader for Reader {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Reader::read(self, path)
    }

    fn extract_to(&self, path: &str, destination: &Path) -> Result<()> {
        Reader::extract_to(self, path, destination)
    }
}

/// Reads `[offset, offset + length)` from a side archive, bounds-checking
/// against the actual file size first.
fn read_range(handle: &mut ArchiveHandle, offset: u64, length: usize) -> Result<Vec<u8>> {
    check_range(handle, offset, length as u64)?;

    handle
        .file
        .seek(SeekFrom::Start(offset))
        .map_err(|_| Error::ArchiveRead(handle.path.clone()))?;

    let mut buf = vec![0u8; length];
    handle
        .file
        .read_exact(&mut buf)
        .map_err(|_| Error::ArchiveRead(handle.path.clone()))?;

    Ok(buf)
}

/// Copies `[offset, offset + length)` from a side archive into `out` in
/// [`STREAM_WINDOW`] sized pieces.
fn stream_range(
    handle: &mut ArchiveHandle,
    offset: u64,
    length: u64,
    out: &mut File,
) -> Result<()> {
    check_range(handle, offset, length)?;

    handle
        .file
        .seek(SeekFrom::Start(offset))
        .map_err(|_| Error::ArchiveRead(handle.path.clone()))?;

    let mut window = vec![0u8; STREAM_WINDOW];
    let mut remaining = length;
    while remaining > 0 {
        let take = remaining.min(STREAM_WINDOW as u64) as usize;
        handle
            .file
            .read_exact(&mut window[..take])
            .map_err(|_| Error::ArchiveRead(handle.path.clone()))?;
        out.write_all(&window[..take]).map_err(Error::Io)?;
        remaining -= take as u64;
    }

    Ok(())
}

fn check_range(handle: &ArchiveHandle, offset: u64, length: u64) -> Result<()> {
    if offset > handle.len || length > handle.len - offset {
        return Err(Error::ArchiveRead(handle.path.clone()));
    }
    Ok(())
}
