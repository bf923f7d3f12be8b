//! On-disk structures of the Respawn VPK format.

use std::fs::File;

use crate::pak::{Error, Result};
use crate::util::buf::{ByteReader, ByteWriter};
use crate::util::file::VPKFileReader;

/// The 4-byte signature found in the header of a valid Respawn VPK file.
pub const VPK_SIGNATURE_RESPAWN: u32 = 0x55AA1234;
/// The major version found in the header of a valid Respawn VPK file.
pub const VPK_MAJOR_VERSION_RESPAWN: u16 = 2;
/// The highest minor version accepted on read. Titanfall 2 archives use
/// minor 0; the packer always emits minor 3.
pub const VPK_MINOR_VERSION_RESPAWN: u16 = 3;
/// Total size of the dir archive header in bytes.
pub const VPK_HEADER_LEN_RESPAWN: usize = 16;

/// Terminates an entry's chunk list in the directory tree.
pub const CHUNK_END_MARKER: u16 = 0xFFFF;
/// Continuation marker written between chunks by some repack tools.
/// Tolerated on read, rejected by the post-bake validator.
pub const CHUNK_CONT_MARKER: u16 = 0x0000;

/// Archive index conventionally used for mod/patch side archives.
pub const PATCH_ARCHIVE_INDEX: u16 = 999;

/// FileSystem visibility.
pub const LOAD_VISIBLE: u32 = 1 << 0;
/// Set for assets not stored in the depot directory.
pub const LOAD_CACHE: u32 = 1 << 8;
/// Set on `.acache` entries.
pub const LOAD_ACACHE_UNK0: u32 = 1 << 10;

/// Default texture flag for `.vtf` entries.
pub const TEXTURE_DEFAULT: u32 = 1 << 3;

/// Sanity limit on the total uncompressed size of a single entry.
pub const MAX_ENTRY_UNCOMPRESSED: u64 = 1024 * 1024 * 1024;
/// Sanity limit on the stored (possibly compressed) size of a single chunk.
pub const MAX_CHUNK_STORED: u64 = 512 * 1024 * 1024;
/// Sanity limit on the uncompressed size of a single chunk.
pub const MAX_CHUNK_LOGICAL: u64 = 512 * 1024 * 1024;

/// The header of a Respawn VPK dir archive.
#[derive(Debug, PartialEq, Eq)]
pub struct VPKHeaderRespawn {
    /// Split VPK version. Major must equal [`VPK_MAJOR_VERSION_RESPAWN`];
    /// minor varies by game build (0 for Titanfall 2, 3 for Apex).
    pub major_version: u16,
    pub minor_version: u16,

    /// Size of the directory tree in bytes, inline preload payloads
    /// included.
    pub tree_length: u32,
}

impl VPKHeaderRespawn {
    /// Read and validate the header from the start of an open file.
    ///
    /// # Errors
    /// - When an IO operation fails
    /// - When the signature or version does not match, or the tree is empty
    pub fn read_from(file: &mut File) -> Result<Self> {
        let signature = file.read_u32().map_err(|e| Error::Util {
            source: e,
            context: "failed to read header signature".to_string(),
        })?;

        if signature != VPK_SIGNATURE_RESPAWN {
            return Err(Error::InvalidSignature(format!(
                "should be {VPK_SIGNATURE_RESPAWN:#010X} but is {signature:#010X}"
            )));
        }

        let major_version = file.read_u16().map_err(|e| Error::Util {
            source: e,
            context: "failed to read header major version".to_string(),
        })?;
        let minor_version = file.read_u16().map_err(|e| Error::Util {
            source: e,
            context: "failed to read header minor version".to_string(),
        })?;

        if major_version != VPK_MAJOR_VERSION_RESPAWN
            || minor_version > VPK_MINOR_VERSION_RESPAWN
        {
            return Err(Error::BadVersion(format!(
                "should be {VPK_MAJOR_VERSION_RESPAWN}.0 through \
                 {VPK_MAJOR_VERSION_RESPAWN}.{VPK_MINOR_VERSION_RESPAWN} \
                 but is {major_version}.{minor_version}"
            )));
        }

        let tree_length = file.read_u32().map_err(|e| Error::Util {
            source: e,
            context: "failed to read header tree length".to_string(),
        })?;

        if tree_length == 0 {
            return Err(Error::TreeCorruption(
                "header declares an empty directory tree".to_string(),
            ));
        }

        // Signature-size field, unused by every known build.
        let _ = file.read_u32().map_err(|e| Error::Util {
            source: e,
            context: "failed to read header signature size".to_string(),
        })?;

        Ok(Self {
            major_version,
            minor_version,
            tree_length,
        })
    }

    /// Append the 16-byte header to an output buffer.
    pub fn write(&self, w: &mut ByteWriter) {
        w.write_u32(VPK_SIGNATURE_RESPAWN);
        w.write_u16(self.major_version);
        w.write_u16(self.minor_version);
        w.write_u32(self.tree_length);
        w.write_u32(0); // signature size (unused)
    }
}

/// One contiguous payload of an entry, stored in a side archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// The side archive this chunk is stored in.
    pub archive_index: u16,
    /// Load flags. Stored as a u16 on disk; widened here because the engine
    /// treats the field as 32-bit internally.
    pub load_flags: u32,
    /// Texture flags (see [`TEXTURE_DEFAULT`]).
    pub texture_flags: u32,
    /// Absolute byte offset of the stored payload within the side archive.
    pub offset: u64,
    /// Bytes occupied in the side archive.
    pub stored_length: u64,
    /// Bytes produced after decompression. Equal to `stored_length` when the
    /// chunk is not compressed.
    pub logical_length: u64,
}

impl ChunkDescriptor {
    /// A chunk is compressed iff its stored and logical lengths differ.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.stored_length != self.logical_length
    }

    /// Read the remainder of a chunk record, the leading `archive_index`
    /// u16 having already been consumed by the chunk-list loop.
    pub(crate) fn read_after_index(r: &mut ByteReader, archive_index: u16) -> Result<Self> {
        let ctx = |e| Error::Util {
            source: e,
            context: "failed to read chunk record".to_string(),
        };

        Ok(Self {
            archive_index,
            load_flags: u32::from(r.read_u16().map_err(ctx)?),
            texture_flags: r.read_u32().map_err(ctx)?,
            offset: r.read_u64().map_err(ctx)?,
            stored_length: r.read_u64().map_err(ctx)?,
            logical_length: r.read_u64().map_err(ctx)?,
        })
    }

    /// Append the chunk record to an output buffer.
    ///
    /// # Errors
    /// When `load_flags` does not fit the on-disk u16.
    pub(crate) fn write(&self, w: &mut ByteWriter) -> Result<()> {
        let load_flags = u16::try_from(self.load_flags)
            .map_err(|_| Error::FlagOverflow(self.load_flags))?;

        w.write_u16(self.archive_index);
        w.write_u16(load_flags);
        w.write_u32(self.texture_flags);
        w.write_u64(self.offset);
        w.write_u64(self.stored_length);
        w.write_u64(self.logical_length);

        Ok(())
    }
}

/// The per-entry record stored in the directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// CRC32 (ISO HDLC) of the entry's logical bytes.
    pub crc32: u32,
    /// Number of bytes stored inline in the dir archive, immediately after
    /// this record's chunk list.
    pub preload_bytes: u16,
    /// Absolute offset of the inline preload payload within the dir
    /// archive. Reader-side bookkeeping; not part of the record on disk.
    pub preload_offset: u64,
    /// The entry's chunks, in logical order. Empty for zero-length files.
    pub chunks: Vec<ChunkDescriptor>,
}

impl EntryRecord {
    /// Total logical size of the entry: preload plus the uncompressed
    /// length of every chunk.
    #[must_use]
    pub fn total_logical_length(&self) -> u64 {
        u64::from(self.preload_bytes)
            + self
                .chunks
                .iter()
                .map(|c| c.logical_length)
                .sum::<u64>()
    }

    /// Read an entry record (CRC through chunk-list terminator). The inline
    /// preload payload that follows is left unread for the caller.
    ///
    /// Any u16 other than [`CHUNK_END_MARKER`] at a chunk boundary starts
    /// the next chunk, which also tolerates the `0x0000` continuation
    /// marker some emitters produce.
    pub(crate) fn read_from(r: &mut ByteReader) -> Result<Self> {
        let ctx = |e| Error::Util {
            source: e,
            context: "failed to read entry record".to_string(),
        };

        let crc32 = r.read_u32().map_err(ctx)?;
        let preload_bytes = r.read_u16().map_err(ctx)?;

        let mut chunks = Vec::new();
        loop {
            let marker = r.read_u16().map_err(ctx)?;
            if marker == CHUNK_END_MARKER {
                break;
            }

            chunks.push(ChunkDescriptor::read_after_index(r, marker)?);
        }

        Ok(Self {
            crc32,
            preload_bytes,
            preload_offset: 0,
            chunks,
        })
    }

    /// Append the record (CRC through chunk-list terminator) to an output
    /// buffer. Inline preload payload is the caller's responsibility.
    pub(crate) fn write(&self, w: &mut ByteWriter) -> Result<()> {
        w.write_u32(self.crc32);
        w.write_u16(self.preload_bytes);

        for chunk in &self.chunks {
            chunk.write(w)?;
        }
        w.write_u16(CHUNK_END_MARKER);

        Ok(())
    }
}
