//! Packing a directory of loose files into a Respawn VPK.
//!
//! The pipeline: enumerate the source tree, build every entry in parallel
//! (chunk split, compression, CAM probing), sort into the deterministic tree
//! order, stream the side archive with content-addressed deduplication, emit
//! the dir archive, re-validate the emitted tree, then write the `.cam`
//! sidecar and refreshed manifest.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_32_ISO_HDLC};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::pak::revpk::cam::{strip_wav_header, CamRecord};
use crate::pak::revpk::format::{
    ChunkDescriptor, EntryRecord, VPKHeaderRespawn, LOAD_ACACHE_UNK0, LOAD_CACHE, LOAD_VISIBLE,
    TEXTURE_DEFAULT, VPK_MAJOR_VERSION_RESPAWN, VPK_MINOR_VERSION_RESPAWN,
};
use crate::pak::revpk::manifest::{
    self, normalize_manifest_key, ManifestEntry, ManifestMap, ManifestWriteItem,
};
use crate::pak::revpk::tree::{self, TreeItem};
use crate::pak::{Error, Result};
use crate::util::buf::ByteWriter;
use crate::util::file::VPKFileWriter;
use crate::util::lzham;
use crate::util::path::{clean_entry_path, extension_lower, side_archive_path, suffix_eq_ci};

/// Knobs for [`pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Index of the side archive every chunk is written to. Mod/patch
    /// archives conventionally use 999.
    pub archive_index: u16,
    /// Split each input file into chunks of at most this many bytes.
    pub max_part_size: usize,
    /// Attempt compression only for chunks at least this large (unless a
    /// manifest overrides the decision per entry).
    pub compression_threshold: usize,
    /// Worker threads for the per-file build phase. Zero picks
    /// `min(cores, file count, 16)`.
    pub thread_count: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            archive_index: 999,
            max_part_size: 1024 * 1024,
            compression_threshold: 4096,
            thread_count: 0,
        }
    }
}

/// Extracts the digit triplet following the literal token `pak` in the
/// filename (`...pak000_dir.vpk` gives 0), or `fallback` when absent.
/// Used to repack over an existing archive set with matching side-archive
/// numbering.
#[must_use]
pub fn infer_archive_index_from_dir_path(path: &Path, fallback: u16) -> u16 {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return fallback;
    };
    let name = name.to_ascii_lowercase();

    let Some(pos) = name.rfind("pak") else {
        return fallback;
    };
    let digits = &name[pos + 3..];
    if digits.len() < 3 || !digits.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
        return fallback;
    }

    digits[..3].parse().unwrap_or(fallback)
}

/// A chunk built by a worker, offset still unassigned.
struct DraftChunk {
    load_flags: u32,
    texture_flags: u32,
    logical_length: u64,
    stored: Vec<u8>,
    stored_crc32: u32,
}

/// An entry built by a worker, in archive-relative form.
struct DraftEntry {
    path: String,
    crc32: u32,
    preload: Vec<u8>,
    de_duplicate: bool,
    chunks: Vec<DraftChunk>,
}

fn compute_crc32(bytes: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    let mut digest = crc.digest();
    digest.update(bytes);
    digest.finalize()
}

/// Packs `input_dir` into `output_dir_vpk_path` (which must end with
/// `_dir.vpk`), its side archive, an optional `.cam` sidecar, and a
/// refreshed build manifest.
///
/// Output is deterministic for a given input tree, options, and manifest.
///
/// # Errors
/// - When the output path extension or input directory is invalid
/// - When reading or compressing any source file fails
/// - When writing any output file fails
/// - When the emitted tree fails re-validation (partial output is left on
///   disk for inspection)
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir_vpk_path: Q,
    options: &PackOptions,
) -> Result<()> {
    let input_dir = input_dir.as_ref();
    let output_path = output_dir_vpk_path.as_ref();

    if !suffix_eq_ci(&output_path.to_string_lossy(), "_dir.vpk") {
        return Err(Error::BadOutputPath(output_path.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(Error::InputNotDirectory(input_dir.to_path_buf()));
    }

    // A broken manifest should not brick the pack; it just means defaults.
    let manifest = match manifest::read_manifest(output_path) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("ignoring unreadable manifest for {}: {e}", output_path.display());
            None
        }
    };

    let mut file_paths: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| {
            let entry = e.ok()?;
            entry.file_type().is_file().then(|| entry.into_path())
        })
        .collect();
    // Entry order is fixed later by the tree sort; sorting here just makes
    // worker scheduling and first-error selection reproducible.
    file_paths.sort();

    log::debug!(
        "packing {} files from {} into {}",
        file_paths.len(),
        input_dir.display(),
        output_path.display()
    );

    let mut drafts = build_entries(input_dir, &file_paths, options, manifest.as_ref())?;
    drafts.sort_by_cached_key(|(draft, _)| tree::split_entry_path(&draft.path));

    let archive_path = side_archive_path(output_path, options.archive_index);
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(Error::Io)?;
        }
    }

    let offsets = write_side_archive(&archive_path, &drafts)?;

    let (items, cams) = into_tree_items(drafts, offsets, options.archive_index);

    let tree_bytes = tree::emit(&items)?;
    let header = VPKHeaderRespawn {
        major_version: VPK_MAJOR_VERSION_RESPAWN,
        minor_version: VPK_MINOR_VERSION_RESPAWN,
        tree_length: tree_bytes.len() as u32,
    };

    let mut dir_vpk = ByteWriter::with_capacity(16 + tree_bytes.len());
    header.write(&mut dir_vpk);
    dir_vpk.write_bytes(&tree_bytes);
    fs::write(output_path, dir_vpk.into_bytes()).map_err(Error::Io)?;

    tree::validate(&tree_bytes, &items)?;

    if !cams.is_empty() {
        write_cam_file(&archive_path, &cams)?;
    }

    refresh_manifest(output_path, &items, manifest.as_ref());

    Ok(())
}

/// Runs the per-file build phase on a bounded worker pool. Results are
/// joined in input order so the first failure (by path order) wins.
fn build_entries(
    input_dir: &Path,
    file_paths: &[PathBuf],
    options: &PackOptions,
    manifest: Option<&ManifestMap>,
) -> Result<Vec<(DraftEntry, Option<CamRecord>)>> {
    let threads = if options.thread_count == 0 {
        let cores = std::thread::available_parallelism().map_or(1, usize::from);
        cores.min(file_paths.len()).min(16).max(1)
    } else {
        options.thread_count
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Worker {
            path: input_dir.to_path_buf(),
            message: format!("failed to build worker pool: {e}"),
        })?;

    let results: Vec<Result<(DraftEntry, Option<CamRecord>)>> = pool.install(|| {
        file_paths
            .par_iter()
            .map(|path| build_entry(input_dir, path, options, manifest))
            .collect()
    });

    let mut out = Vec::with_capacity(results.len());
    for (path, result) in file_paths.iter().zip(results) {
        match result {
            Ok(built) => out.push(built),
            Err(e) => {
                return Err(Error::Worker {
                    path: path.clone(),
                    message: e.to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Builds one entry: read, CAM probe and header strip for WAVs, CRC, chunk
/// split, per-chunk compression, flag assignment.
fn build_entry(
    input_dir: &Path,
    abs_path: &Path,
    options: &PackOptions,
    manifest: Option<&ManifestMap>,
) -> Result<(DraftEntry, Option<CamRecord>)> {
    let rel = abs_path
        .strip_prefix(input_dir)
        .unwrap_or(abs_path)
        .to_string_lossy()
        .into_owned();
    let path = clean_entry_path(&rel);
    let ext = extension_lower(&path);

    let mut bytes = fs::read(abs_path).map_err(Error::Io)?;

    let mut cam = None;
    if ext == "wav" {
        if let Some(record) = CamRecord::from_wav(&bytes) {
            // The engine rebuilds the RIFF header from the CAM record, so
            // the stored copy carries a blanked header. WAVs that fail the
            // probe are stored intact with no record.
            strip_wav_header(&mut bytes);
            cam = Some(record);
        }
    }

    let crc32 = compute_crc32(&bytes);

    let manifest_values: Option<&ManifestEntry> =
        manifest.and_then(|m| m.get(&normalize_manifest_key(&path)));

    let (load_flags, texture_flags) = match manifest_values {
        Some(v) => (v.load_flags, u32::from(v.texture_flags)),
        None => {
            let mut load = LOAD_VISIBLE | LOAD_CACHE;
            if ext == "acache" {
                load |= LOAD_ACACHE_UNK0;
            }
            let texture = if ext == "vtf" { TEXTURE_DEFAULT } else { 0 };
            (load, texture)
        }
    };

    let preload_size = manifest_values
        .map_or(0, |v| usize::from(v.preload_size))
        .min(bytes.len());
    let preload = bytes[..preload_size].to_vec();
    let body = &bytes[preload_size..];

    let compression_excluded = ext == "wav" || ext == "vtf";

    let mut chunks = Vec::with_capacity(body.len().div_ceil(options.max_part_size.max(1)));
    let mut offset = 0;
    while offset < body.len() {
        let part_len = options.max_part_size.min(body.len() - offset);
        let part = &body[offset..offset + part_len];

        let eligible = match manifest_values {
            Some(v) => v.use_compression,
            None => part_len >= options.compression_threshold,
        } && !compression_excluded;

        let stored = if eligible {
            let compressed = lzham::compress(part);
            if compressed.len() < part.len() {
                compressed
            } else {
                part.to_vec()
            }
        } else {
            part.to_vec()
        };

        let stored_crc32 = compute_crc32(&stored);
        chunks.push(DraftChunk {
            load_flags,
            texture_flags,
            logical_length: part_len as u64,
            stored,
            stored_crc32,
        });

        offset += part_len;
    }

    Ok((
        DraftEntry {
            path,
            crc32,
            preload,
            de_duplicate: manifest_values.map_or(true, |v| v.de_duplicate),
            chunks,
        },
        cam,
    ))
}

/// Streams every chunk into the side archive in sorted-entry order,
/// deduplicating identical payloads, and returns the per-chunk offsets.
///
/// Dedup key is `(payload CRC32 << 32) | payload length`; candidates are
/// byte-compared before their offset is reused, so a hash collision falls
/// through to a fresh write.
fn write_side_archive(
    archive_path: &Path,
    drafts: &[(DraftEntry, Option<CamRecord>)],
) -> Result<Vec<Vec<u64>>> {
    let file = File::create(archive_path).map_err(Error::Io)?;
    let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, file);

    let mut offsets: Vec<Vec<u64>> = drafts
        .iter()
        .map(|(d, _)| vec![0u64; d.chunks.len()])
        .collect();
    let mut dedup: HashMap<u64, Vec<(usize, usize)>> = HashMap::new();
    let mut write_pos = 0u64;
    let mut reuse_count = 0usize;

    for di in 0..drafts.len() {
        for ci in 0..drafts[di].0.chunks.len() {
            let chunk = &drafts[di].0.chunks[ci];
            let size = chunk.stored.len() as u64;
            if size == 0 {
                offsets[di][ci] = write_pos;
                continue;
            }

            let key = (u64::from(chunk.stored_crc32) << 32) | size;

            let mut reused = false;
            if drafts[di].0.de_duplicate {
                if let Some(candidates) = dedup.get(&key) {
                    for &(pdi, pci) in candidates {
                        if drafts[pdi].0.chunks[pci].stored == chunk.stored {
                            offsets[di][ci] = offsets[pdi][pci];
                            reused = true;
                            reuse_count += 1;
                            break;
                        }
                    }
                }
            }

            if !reused {
                offsets[di][ci] = write_pos;
                writer.write_bytes(&chunk.stored).map_err(|e| Error::Util {
                    source: e,
                    context: format!("failed to write archive {}", archive_path.display()),
                })?;
                if drafts[di].0.de_duplicate {
                    dedup.entry(key).or_default().push((di, ci));
                }
                write_pos += size;
            }
        }
    }

    writer.flush().map_err(Error::Io)?;

    if reuse_count > 0 {
        log::debug!("deduplicated {reuse_count} chunks in {}", archive_path.display());
    }

    Ok(offsets)
}

/// Converts sorted drafts plus assigned offsets into tree items, patching
/// each WAV's CAM record with its first chunk offset.
fn into_tree_items(
    drafts: Vec<(DraftEntry, Option<CamRecord>)>,
    offsets: Vec<Vec<u64>>,
    archive_index: u16,
) -> (Vec<TreeItem>, Vec<CamRecord>) {
    let mut items = Vec::with_capacity(drafts.len());
    let mut cams = Vec::new();

    for ((draft, cam), chunk_offsets) in drafts.into_iter().zip(offsets) {
        let chunks: Vec<ChunkDescriptor> = draft
            .chunks
            .iter()
            .zip(&chunk_offsets)
            .map(|(chunk, &offset)| ChunkDescriptor {
                archive_index,
                load_flags: chunk.load_flags,
                texture_flags: chunk.texture_flags,
                offset,
                stored_length: chunk.stored.len() as u64,
                logical_length: chunk.logical_length,
            })
            .collect();

        if let Some(mut record) = cam {
            record.vpk_content_offset = chunk_offsets.first().copied().unwrap_or(0);
            cams.push(record);
        }

        let record = EntryRecord {
            crc32: draft.crc32,
            preload_bytes: 0, // set by TreeItem::new from the payload
            preload_offset: 0,
            chunks,
        };
        items.push(TreeItem::new(draft.path, record, draft.preload));
    }

    (items, cams)
}

/// Writes the `.cam` sidecar next to the side archive, records in entry
/// order.
fn write_cam_file(archive_path: &Path, cams: &[CamRecord]) -> Result<()> {
    let mut w = ByteWriter::with_capacity(cams.len() * 32);
    for record in cams {
        record.write(&mut w);
    }

    let mut cam_path = archive_path.as_os_str().to_owned();
    cam_path.push(".cam");
    fs::write(PathBuf::from(cam_path), w.into_bytes()).map_err(Error::Io)?;

    Ok(())
}

/// Serializes the final per-entry flags back into the manifest, so a later
/// repack of the unpacked tree preserves them. Failures are logged, not
/// fatal; the archives themselves are already on disk.
fn refresh_manifest(
    output_path: &Path,
    items: &[TreeItem],
    input_manifest: Option<&ManifestMap>,
) {
    let write_items: Vec<ManifestWriteItem> = items
        .iter()
        .map(|item| {
            let first = item.record.chunks.first();
            let de_duplicate = input_manifest
                .and_then(|m| m.get(&normalize_manifest_key(&item.path)))
                .map_or(true, |v| v.de_duplicate);

            ManifestWriteItem {
                path: item.path.clone(),
                values: ManifestEntry {
                    preload_size: item.record.preload_bytes,
                    load_flags: first.map_or(LOAD_VISIBLE | LOAD_CACHE, |c| c.load_flags),
                    texture_flags: first.map_or(0, |c| c.texture_flags as u16),
                    use_compression: first.is_some_and(ChunkDescriptor::is_compressed),
                    de_duplicate,
                },
            }
        })
        .collect();

    if let Err(e) = manifest::write_manifest(output_path, &write_items) {
        log::warn!("failed to refresh manifest for {}: {e}", output_path.display());
    }
}
