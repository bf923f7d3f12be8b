use std::path::PathBuf;

use thiserror::Error;

use crate::util;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced while parsing, reading, or packing Respawn VPKs.
///
/// Display strings are the user-facing diagnostics; the reader mirrors the
/// most recent one through [`Reader::last_error`](crate::pak::revpk::read::Reader::last_error).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid VPK header signature: {0}")]
    InvalidSignature(String),

    #[error("unsupported VPK version: {0}")]
    BadVersion(String),

    #[error("dir tree corruption detected: {0}")]
    TreeCorruption(String),

    #[error("dir tree validation failed: {0}")]
    TreeValidation(String),

    #[error("entry not found in Respawn VPK tree: {0}")]
    EntryNotFound(String),

    #[error("archive part too large ({0} length)")]
    PartTooLarge(&'static str),

    #[error("entry too large (uncompressed)")]
    EntryTooLarge,

    #[error("failed to read preload bytes from directory VPK")]
    PreloadRead,

    #[error("failed to read archive part from: {0}")]
    ArchiveRead(PathBuf),

    #[error("failed to LZHAM decompress chunk (archiveIndex={0})")]
    Decompress(u16),

    #[error("this entry is LZHAM compressed, but built without LZHAM support")]
    LzhamUnsupported,

    #[error("load flags exceed 16 bits: {0:#x}")]
    FlagOverflow(u32),

    #[error("output path must end with _dir.vpk: {0}")]
    BadOutputPath(PathBuf),

    #[error("input path is not a directory: {0}")]
    InputNotDirectory(PathBuf),

    #[error("failed while reading or compressing {path}: {message}")]
    Worker { path: PathBuf, message: String },

    #[error("invalid manifest: {0}")]
    ManifestParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    Util {
        source: util::Error,
        context: String,
    },
}
