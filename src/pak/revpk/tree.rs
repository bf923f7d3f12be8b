//! Directory-tree codec.
//!
//! The tree is a triple-nested null-terminated string table: extension,
//! then directory, then file stem, then the entry record. A string of
//! exactly `" "` (one space) stands for "empty" at any of the three levels,
//! so extensionless files and archive-root files can be encoded. Inline
//! preload payloads sit between an entry's chunk-list terminator and the
//! next string.

use std::collections::{HashMap, HashSet};

use crate::pak::revpk::format::{EntryRecord, CHUNK_CONT_MARKER, CHUNK_END_MARKER};
use crate::pak::{Error, Result};
use crate::util::buf::{ByteReader, ByteWriter};
use crate::util::path::extension_lower;

/// The sentinel string standing for an empty extension, directory, or stem.
pub const EMPTY_SENTINEL: &str = " ";

/// An entry prepared for tree emission: the split path components, the
/// record, and the inline preload payload (usually empty).
#[derive(Debug, Clone)]
pub struct TreeItem {
    pub path: String,
    pub ext: String,
    pub dir: String,
    pub file_stem: String,
    pub record: EntryRecord,
    pub preload: Vec<u8>,
}

impl TreeItem {
    /// Builds a tree item from an archive-relative path. `record.preload_bytes`
    /// is forced to match the payload length.
    #[must_use]
    pub fn new(path: String, mut record: EntryRecord, preload: Vec<u8>) -> Self {
        record.preload_bytes = preload.len() as u16;
        let (ext, dir, file_stem) = split_entry_path(&path);
        Self {
            path,
            ext,
            dir,
            file_stem,
            record,
            preload,
        }
    }

    fn sort_key(&self) -> (&str, &str, &str) {
        (&self.ext, &self.dir, &self.file_stem)
    }
}

/// Splits an archive-relative path into the `(ext, dir, file_stem)` triple
/// used by the tree, substituting [`EMPTY_SENTINEL`] for absent components.
#[must_use]
pub fn split_entry_path(path: &str) -> (String, String, String) {
    let (dir, file_name) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };

    let ext = extension_lower(file_name);
    let file_stem = if ext.is_empty() {
        file_name.to_string()
    } else {
        file_name[..file_name.len() - ext.len() - 1].to_string()
    };

    (
        if ext.is_empty() {
            EMPTY_SENTINEL.to_string()
        } else {
            ext
        },
        if dir.is_empty() {
            EMPTY_SENTINEL.to_string()
        } else {
            dir.to_string()
        },
        if file_stem.is_empty() {
            EMPTY_SENTINEL.to_string()
        } else {
            file_stem
        },
    )
}

/// Reassembles the full path from the tree's `(ext, dir, file_stem)` triple.
#[must_use]
pub fn join_entry_path(ext: &str, dir: &str, file_stem: &str) -> String {
    let mut path = if file_stem == EMPTY_SENTINEL {
        String::new()
    } else {
        file_stem.to_string()
    };

    if ext != EMPTY_SENTINEL {
        path.push('.');
        path.push_str(ext);
    }

    if dir != EMPTY_SENTINEL && !dir.is_empty() {
        path = format!("{dir}/{path}");
    }

    path
}

/// Sorts items into the deterministic emission order `(ext, dir, file_stem)`
/// ascending.
pub fn sort_items(items: &mut [TreeItem]) {
    items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Parses a directory tree into `(path, record)` pairs, in on-disk order.
///
/// `base_offset` is the absolute offset of the tree within the dir archive
/// (the header length); it is used to record each entry's
/// [`preload_offset`](EntryRecord::preload_offset).
///
/// The parser is tolerant of the `0x0000` chunk continuation marker some
/// emitters produce: any u16 other than the `0xFFFF` terminator at a chunk
/// boundary is taken as the next chunk's archive index.
///
/// # Errors
/// - When any fixed-width read runs past the end of the tree
/// - When a directory string begins with a space but is not exactly `" "`
pub fn parse(tree: &[u8], base_offset: u64) -> Result<Vec<(String, EntryRecord)>> {
    let mut r = ByteReader::new(tree);
    let mut entries = Vec::new();

    let ctx = |what: &str| {
        let what = what.to_string();
        move |e| Error::Util {
            source: e,
            context: what,
        }
    };

    loop {
        let ext = r.read_string().map_err(ctx("failed to read extension"))?;
        if ext.is_empty() {
            break;
        }

        loop {
            let dir = r.read_string().map_err(ctx("failed to read directory"))?;
            if dir.is_empty() {
                break;
            }
            if dir.starts_with(' ') && dir != EMPTY_SENTINEL {
                return Err(Error::TreeCorruption(format!(
                    "directory begins with a space: {dir:?}"
                )));
            }

            loop {
                let file_stem = r.read_string().map_err(ctx("failed to read file name"))?;
                if file_stem.is_empty() {
                    break;
                }

                let mut record = EntryRecord::read_from(&mut r)?;

                if record.preload_bytes > 0 {
                    record.preload_offset = base_offset + r.position() as u64;
                    r.skip(record.preload_bytes as usize)
                        .map_err(ctx("failed to skip preload data"))?;
                }

                entries.push((join_entry_path(&ext, &dir, &file_stem), record));
            }
        }
    }

    Ok(entries)
}

/// Emits the directory tree for `items`, which must already be in
/// [`sort_items`] order. Chunk offsets must be final; the emitted bytes are
/// what lands in the dir archive after the header.
///
/// # Errors
/// When a chunk's load flags exceed the on-disk 16 bits.
pub fn emit(items: &[TreeItem]) -> Result<Vec<u8>> {
    let estimate: usize = items
        .iter()
        .map(|i| {
            i.ext.len() + i.dir.len() + i.file_stem.len() + 12 + i.record.chunks.len() * 34 + i.preload.len()
        })
        .sum();
    let mut w = ByteWriter::with_capacity(estimate + 3);

    let mut last_ext: Option<&str> = None;
    let mut last_dir: Option<&str> = None;

    for item in items {
        if last_ext.is_some_and(|e| e != item.ext) {
            // Closes the filename loop and the directory loop of the
            // previous extension in one go.
            w.write_u16(0);
            last_dir = None;
        } else if last_dir.is_some_and(|d| d != item.dir) {
            w.write_u8(0);
        }

        if last_ext != Some(item.ext.as_str()) {
            w.write_string(&item.ext);
            last_ext = Some(item.ext.as_str());
        }
        if last_dir != Some(item.dir.as_str()) {
            w.write_string(&item.dir);
            last_dir = Some(item.dir.as_str());
        }
        w.write_string(&item.file_stem);

        item.record.write(&mut w)?;
        w.write_bytes(&item.preload);
    }

    // Empty filename, directory, and extension close the whole tree.
    w.write_u24(0);

    Ok(w.into_bytes())
}

/// Strict re-parse of an emitted tree against the items it was built from.
///
/// Where the reading parser is tolerant, this pass knows each entry's chunk
/// count and demands a literal `0xFFFF` terminator, flags stray `0x0000`
/// continuation markers, and confirms the path sets match exactly.
///
/// # Errors
/// [`Error::TreeValidation`] with a diagnostic naming the mismatch.
pub fn validate(tree: &[u8], items: &[TreeItem]) -> Result<()> {
    let expected: HashMap<&str, &TreeItem> =
        items.iter().map(|i| (i.path.as_str(), i)).collect();

    let mut r = ByteReader::new(tree);
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    let fail = |what: String| Err(Error::TreeValidation(what));
    let parse_fail = |what: &str| {
        let what = format!("parse failed while reading {what}");
        move |_| Error::TreeValidation(what)
    };

    loop {
        let ext = r.read_string().map_err(parse_fail("extension"))?;
        if ext.is_empty() {
            break;
        }

        loop {
            let dir = r.read_string().map_err(parse_fail("directory"))?;
            if dir.is_empty() {
                break;
            }
            if dir.starts_with(' ') && dir != EMPTY_SENTINEL {
                return fail(format!("directory begins with a space: {dir:?}"));
            }

            loop {
                let file_stem = r.read_string().map_err(parse_fail("file name"))?;
                if file_stem.is_empty() {
                    break;
                }

                let path = join_entry_path(&ext, &dir, &file_stem);
                let Some(item) = expected.get(path.as_str()) else {
                    return fail(format!("unexpected path: {path}"));
                };

                let _crc = r.read_u32().map_err(parse_fail("entry CRC"))?;
                let preload_bytes = r.read_u16().map_err(parse_fail("preload length"))?;

                for _ in 0..item.record.chunks.len() {
                    let _index = r.read_u16().map_err(parse_fail("archive index"))?;
                    let _flags = r.read_u16().map_err(parse_fail("load flags"))?;
                    let _tex = r.read_u32().map_err(parse_fail("texture flags"))?;
                    let _off = r.read_u64().map_err(parse_fail("chunk offset"))?;
                    let _len = r.read_u64().map_err(parse_fail("chunk length"))?;
                    let _ulen = r.read_u64().map_err(parse_fail("chunk uncompressed length"))?;
                }

                let marker = r.read_u16().map_err(parse_fail("chunk terminator"))?;
                if marker == CHUNK_CONT_MARKER {
                    return fail(format!("stray continuation marker after chunk list: {path}"));
                }
                if marker != CHUNK_END_MARKER {
                    return fail(format!(
                        "invalid chunk terminator {marker:#06X} after chunk list: {path}"
                    ));
                }

                r.skip(preload_bytes as usize)
                    .map_err(parse_fail("preload data"))?;

                seen.insert(path);
            }
        }
    }

    if seen.len() != expected.len() {
        return fail(format!(
            "entry count mismatch: expected {}, got {}",
            expected.len(),
            seen.len()
        ));
    }
    for path in expected.keys() {
        if !seen.contains(*path) {
            return fail(format!("missing path: {path}"));
        }
    }

    Ok(())
}
