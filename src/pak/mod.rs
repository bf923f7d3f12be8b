//! Archive format support.
//!
//! Only the Respawn packedstore variant lives here; the format decision is
//! made at the call site, so the seam between callers and a format is the
//! narrow [`ArchiveReader`] trait rather than a polymorphic base type.

use std::path::Path;

pub use error::{Error, Result};

pub mod revpk;

mod error;

/// Read-side operations every archive format exposes.
pub trait ArchiveReader {
    /// Read the contents of a stored entry into memory.
    ///
    /// # Errors
    /// - When the entry does not exist
    /// - When the entry or one of its chunks exceeds the sanity limits
    /// - When archive bytes cannot be read or decompressed
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Stream the contents of a stored entry to a file, without
    /// materializing the whole entry in memory.
    ///
    /// # Errors
    /// Same conditions as [`ArchiveReader::read`], plus output I/O failures.
    fn extract_to(&self, path: &str, destination: &Path) -> Result<()>;
}
