//! CAM sidecar records.
//!
//! Respawn games store WAV entries with their 44-byte RIFF header blanked
//! out; the engine reconstructs the header at load time from a `.cam` file
//! next to the side archive. The packer's job is to probe each WAV, blank
//! the header, and emit one fixed 32-byte record per WAV entry, in dir-tree
//! order.

use std::fs::File;

use crate::pak::{Error, Result};
use crate::util::buf::ByteWriter;
use crate::util::file::VPKFileReader;

/// The 4-byte magic found at the start of a CAM record (0xC4DE1A00).
pub const CAM_RECORD_MAGIC: u32 = 3302889984;
/// Size of one CAM record on disk.
pub const CAM_RECORD_LEN: usize = 32;
/// Size of the RIFF header blanked out of stored WAV payloads.
pub const WAV_HEADER_LEN: usize = 44;
/// Fill byte used to blank the stored RIFF header.
pub const WAV_HEADER_FILL: u8 = 0xCB;

/// One 32-byte record of a `.cam` sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CamRecord {
    /// Should equal [`CAM_RECORD_MAGIC`].
    pub magic: u32,
    /// Size of the WAV file including its header.
    pub original_size: u32,
    /// Size of the stored payload. Equal to `original_size` for freshly
    /// packed files.
    pub compressed_size: u32,
    /// Sample rate. Stored as a u24.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u8,
    /// Number of samples in the data chunk.
    pub sample_count: u32,
    /// RIFF header size; always 44.
    pub header_size: u32,
    /// Absolute offset of the WAV's first chunk within its side archive.
    pub vpk_content_offset: u64,
}

impl CamRecord {
    /// Probes a WAV file and derives its CAM record.
    ///
    /// Returns `None` when the bytes are not a usable RIFF/WAVE file
    /// (missing magic, zero channels, or zero block alignment); such files
    /// are stored unchanged with no record.
    #[must_use]
    pub fn from_wav(file: &[u8]) -> Option<Self> {
        if file.len() < WAV_HEADER_LEN {
            return None;
        }
        if &file[0..4] != b"RIFF" || &file[8..12] != b"WAVE" {
            return None;
        }

        let read_u16 = |off: usize| u16::from_le_bytes([file[off], file[off + 1]]);
        let read_u32 = |off: usize| {
            u32::from_le_bytes([file[off], file[off + 1], file[off + 2], file[off + 3]])
        };

        let sample_rate = read_u32(24);
        let channels = read_u16(22);
        let block_align = read_u16(32);
        let data_length = read_u32(40);
        if channels == 0 || block_align == 0 {
            return None;
        }

        Some(Self {
            magic: CAM_RECORD_MAGIC,
            original_size: file.len() as u32,
            compressed_size: file.len() as u32,
            sample_rate,
            channels: (channels & 0xFF) as u8,
            sample_count: data_length / u32::from(block_align),
            header_size: WAV_HEADER_LEN as u32,
            vpk_content_offset: 0,
        })
    }

    /// Appends the 32-byte record to an output buffer.
    pub fn write(&self, w: &mut ByteWriter) {
        w.write_u32(self.magic);
        w.write_u32(self.original_size);
        w.write_u32(self.compressed_size);
        w.write_u24(self.sample_rate & 0x00FF_FFFF);
        w.write_u8(self.channels);
        w.write_u32(self.sample_count);
        w.write_u32(self.header_size);
        w.write_u64(self.vpk_content_offset);
    }
}

/// Overwrites the 44-byte RIFF header with [`WAV_HEADER_FILL`] in place.
///
/// Already-blanked input is left untouched, so re-packing an unpacked
/// archive does not double-strip.
pub fn strip_wav_header(file: &mut [u8]) {
    if file.len() < WAV_HEADER_LEN {
        return;
    }
    if file[0..4] == [WAV_HEADER_FILL; 4] {
        return;
    }
    file[..WAV_HEADER_LEN].fill(WAV_HEADER_FILL);
}

/// Reads a `.cam` sidecar, returning its records in on-disk order (which
/// for a packer-emitted sidecar is dir-tree entry order). Records with an
/// unexpected magic are skipped.
///
/// # Errors
/// When an IO operation fails mid-record.
pub fn read_cam_file(file: &mut File) -> Result<Vec<CamRecord>> {
    let ctx = |e| Error::Util {
        source: e,
        context: "failed to read CAM record".to_string(),
    };

    let len = file.metadata().map_err(Error::Io)?.len();
    let mut records = Vec::with_capacity((len / CAM_RECORD_LEN as u64) as usize);

    let mut pos = 0;
    while pos + CAM_RECORD_LEN as u64 <= len {
        let record = CamRecord {
            magic: file.read_u32().map_err(ctx)?,
            original_size: file.read_u32().map_err(ctx)?,
            compressed_size: file.read_u32().map_err(ctx)?,
            sample_rate: file.read_u24().map_err(ctx)?,
            channels: file.read_u8().map_err(ctx)?,
            sample_count: file.read_u32().map_err(ctx)?,
            header_size: file.read_u32().map_err(ctx)?,
            vpk_content_offset: file.read_u64().map_err(ctx)?,
        };

        if record.magic == CAM_RECORD_MAGIC {
            records.push(record);
        } else {
            log::warn!(
                "skipping CAM record with unexpected magic {:#010X}",
                record.magic
            );
        }

        pos += CAM_RECORD_LEN as u64;
    }

    Ok(records)
}
