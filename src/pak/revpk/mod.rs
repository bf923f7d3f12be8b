//! Support for the Respawn VPK format.

pub use pack::{infer_archive_index_from_dir_path, pack, PackOptions};
pub use read::{EntrySummary, Reader};

pub mod cam;
pub mod format;
pub mod manifest;
pub mod pack;
pub mod read;
pub mod tree;
