//! packedstore provides support for working with Respawn VPK ("packedstore")
//! files, the archive format used by Titanfall 2, Apex Legends, and
//! derivatives.
//!
//! These are still `.vpk` files, but they use a split major/minor header
//! version (2.x) and per-file chunk records with 64-bit offsets/lengths,
//! commonly LZHAM compressed. Entry payloads live in numbered side archives
//! (`*_000.vpk`, `*_001.vpk`, ...) next to the directory archive.
//!
//! # What's here
//! - [`pak::revpk::read::Reader`]: open a `*_dir.vpk`, list entries, read
//!   them into memory or stream them to disk.
//! - [`pak::revpk::pack::pack`]: pack a folder of loose files into a dir
//!   archive, a side archive, optional `.cam` audio sidecar, and a refreshed
//!   build manifest.
//!
//! # Features
//! - `lzham`: Add LZHAM compression support through `lzham-alpha-sys`.
//!   Without it, reads of compressed chunks fail with a descriptive error
//!   and the packer stores all chunks uncompressed.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod pak;
pub mod util;
