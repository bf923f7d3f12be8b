//! Helper methods for LZHAM compression and decompression.
//!
//! Uses the [`lzham_alpha_sys`] crate for bindings to the LZHAM alpha
//! library. Respawn archives require a dictionary size of 2^20 and
//! deterministic parsing; the compression level matches the engine default.
//!
//! When the `lzham` feature is disabled, [`decompress`] always fails with
//! [`LzhamError::Unsupported`] and [`compress`] returns its input unchanged,
//! so the packer stores everything uncompressed.

use thiserror::Error;

/// Outcome of a failed LZHAM operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LzhamError {
    /// The library was built without the `lzham` feature.
    #[error("built without LZHAM support")]
    Unsupported,

    /// The codec reported a non-success status, or produced a size outside
    /// the expected bounds.
    #[error("LZHAM codec failure")]
    Failed,
}

pub type Result<T> = core::result::Result<T, LzhamError>;

#[cfg(feature = "lzham")]
mod bridge {
    use super::{LzhamError, Result};

    use std::mem::size_of;
    use std::ptr::null;

    /// Largest destination buffer the compressor will grow to before giving
    /// up and storing the chunk uncompressed.
    const MAX_COMPRESS_BUFFER: usize = 128 * 1024 * 1024;

    use lzham_alpha_sys::{
        lzham_compress_flags_LZHAM_COMP_FLAG_DETERMINISTIC_PARSING,
        lzham_compress_level_LZHAM_COMP_LEVEL_DEFAULT, lzham_compress_memory,
        lzham_compress_params, lzham_compress_status_t_LZHAM_COMP_STATUS_OUTPUT_BUF_TOO_SMALL,
        lzham_compress_status_t_LZHAM_COMP_STATUS_SUCCESS,
        lzham_decompress_flags_LZHAM_DECOMP_FLAG_COMPUTE_ADLER32,
        lzham_decompress_flags_LZHAM_DECOMP_FLAG_OUTPUT_UNBUFFERED, lzham_decompress_memory,
        lzham_decompress_params, lzham_decompress_status_t_LZHAM_DECOMP_STATUS_SUCCESS,
        lzham_uint32,
    };

    const TFLZHAM_DICT_SIZE: u32 = 20; // required for compatibility

    const TFLZHAM_COMPRESS_PARAMS: lzham_compress_params = lzham_compress_params {
        m_struct_size: size_of::<lzham_compress_params>() as _,
        m_dict_size_log2: TFLZHAM_DICT_SIZE,
        m_compress_flags: lzham_compress_flags_LZHAM_COMP_FLAG_DETERMINISTIC_PARSING as _,
        m_level: lzham_compress_level_LZHAM_COMP_LEVEL_DEFAULT,
        m_max_helper_threads: -1,
        m_cpucache_total_lines: 0,
        m_cpucache_line_size: 0,
        m_num_seed_bytes: 0,
        m_pSeed_bytes: null(),
    };

    const TFLZHAM_DECOMPRESS_PARAMS: lzham_decompress_params = lzham_decompress_params {
        m_struct_size: size_of::<lzham_decompress_params>() as _,
        m_dict_size_log2: TFLZHAM_DICT_SIZE,
        m_decompress_flags: (lzham_decompress_flags_LZHAM_DECOMP_FLAG_OUTPUT_UNBUFFERED
            | lzham_decompress_flags_LZHAM_DECOMP_FLAG_COMPUTE_ADLER32) as _,
        m_num_seed_bytes: 0,
        m_pSeed_bytes: null(),
    };

    pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if src.is_empty() || expected_len == 0 {
            return Err(LzhamError::Failed);
        }

        let mut dst = vec![0u8; expected_len];
        let mut dst_len = expected_len;
        let mut adler32: lzham_uint32 = 0;

        let status = unsafe {
            lzham_decompress_memory(
                &TFLZHAM_DECOMPRESS_PARAMS,
                dst.as_mut_ptr(),
                &mut dst_len,
                src.as_ptr(),
                src.len(),
                &mut adler32,
            )
        };

        if status != lzham_decompress_status_t_LZHAM_DECOMP_STATUS_SUCCESS
            || dst_len == 0
            || dst_len > expected_len
        {
            return Err(LzhamError::Failed);
        }

        dst.truncate(dst_len);
        Ok(dst)
    }

    pub fn compress(src: &[u8]) -> Vec<u8> {
        if src.is_empty() {
            return Vec::new();
        }

        // Slack covers incompressible input, where the stream can grow a
        // little past the source size.
        let slack = (src.len() / 16).clamp(1024, 64 * 1024);
        let mut dst = vec![0u8; src.len() + slack];

        for _ in 0..6 {
            let mut dst_len = dst.len();
            let mut adler32: lzham_uint32 = 0;

            let status = unsafe {
                lzham_compress_memory(
                    &TFLZHAM_COMPRESS_PARAMS,
                    dst.as_mut_ptr(),
                    &mut dst_len,
                    src.as_ptr(),
                    src.len(),
                    &mut adler32,
                )
            };

            if status == lzham_compress_status_t_LZHAM_COMP_STATUS_SUCCESS {
                dst.truncate(dst_len);
                return dst;
            }

            if status == lzham_compress_status_t_LZHAM_COMP_STATUS_OUTPUT_BUF_TOO_SMALL {
                let next = (dst.len() * 2).clamp(1024, MAX_COMPRESS_BUFFER);
                if next <= dst.len() {
                    break;
                }
                dst.resize(next, 0);
                continue;
            }

            break;
        }

        // Any failure means the chunk gets stored as-is.
        src.to_vec()
    }
}

/// Decompresses `src`, which must inflate to at most `expected_len` bytes.
///
/// # Errors
/// - [`LzhamError::Unsupported`] when built without the `lzham` feature
/// - [`LzhamError::Failed`] when the codec reports any status other than
///   success, produces zero bytes, or produces more than `expected_len`
#[cfg(feature = "lzham")]
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    bridge::decompress(src, expected_len)
}

/// Compresses `src` with the fixed Respawn parameters.
///
/// Returns the input unchanged when compression fails for any reason; the
/// caller detects the fallback by comparing lengths against the original
/// (an unchanged chunk is stored uncompressed).
#[cfg(feature = "lzham")]
#[must_use]
pub fn compress(src: &[u8]) -> Vec<u8> {
    bridge::compress(src)
}

#[cfg(not(feature = "lzham"))]
pub fn decompress(_src: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
    Err(LzhamError::Unsupported)
}

#[cfg(not(feature = "lzham"))]
#[must_use]
pub fn compress(src: &[u8]) -> Vec<u8> {
    src.to_vec()
}
