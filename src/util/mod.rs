//! Common utilities for the library.
//!
//! Includes binary file and buffer I/O, archive path handling, and, when the
//! `lzham` feature is enabled, support for the [LZHAM alpha](https://github.com/richgel999/lzham_alpha)
//! compression format.

pub use error::{Error, Result};

pub mod buf;
pub mod file;
pub mod lzham;
pub mod path;

mod error;
