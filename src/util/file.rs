//! File reading utilities for VPK files.
//!
//! Counterparts of [`crate::util::buf`] for data that has to be pulled
//! straight from (or pushed straight to) a file handle: archive headers,
//! tree payloads, CAM sidecars, and the side-archive writer.

use super::{Error, Result};

use std::{
    fs::File,
    io::{Read, Write},
};

/// Reads exactly `N` bytes into a fixed array. Short reads are errors;
/// parsing must never continue past EOF.
fn read_array<const N: usize>(file: &mut File) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn put<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes)?;
    Ok(())
}

/// Trait for reading data from binary files.
///
/// Everything is little-endian and advances the cursor past what it read.
pub trait VPKFileReader {
    /// Reads a single byte from the file into a [`u8`].
    fn read_u8(&mut self) -> Result<u8>;

    /// Reads 2 bytes from the file into a [`u16`].
    fn read_u16(&mut self) -> Result<u16>;

    /// Reads 3 bytes from the file into a [`u32`].
    fn read_u24(&mut self) -> Result<u32>;

    /// Reads 4 bytes from the file into a [`u32`].
    fn read_u32(&mut self) -> Result<u32>;

    /// Reads 8 bytes from the file into a [`u64`].
    fn read_u64(&mut self) -> Result<u64>;

    /// Reads a null-terminated string from the file.
    fn read_string(&mut self) -> Result<String>;

    /// Reads exactly `count` bytes from the file into a [`Vec<u8>`].
    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>>;
}

impl VPKFileReader for File {
    fn read_u8(&mut self) -> Result<u8> {
        Ok(read_array::<1>(self)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(self)?))
    }

    fn read_u24(&mut self) -> Result<u32> {
        let [lo, mid, hi] = read_array(self)?;
        Ok(u32::from_le_bytes([lo, mid, hi, 0]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(read_array(self)?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(self)?))
    }

    fn read_string(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            match read_array::<1>(self)? {
                [0] => break,
                [byte] => out.push(byte),
            }
        }

        String::from_utf8(out).map_err(Error::Utf8)
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0; count];
        self.read_exact(&mut buffer)?;

        Ok(buffer)
    }
}

/// Trait for writing data to binary files.
///
/// Everything is little-endian and advances the cursor past what it wrote.
pub trait VPKFileWriter {
    /// Writes a single byte to the file from a [`u8`].
    fn write_u8(&mut self, val: u8) -> Result<()>;

    /// Writes 2 bytes to the file from a [`u16`].
    fn write_u16(&mut self, val: u16) -> Result<()>;

    /// Writes 3 bytes to the file from a [`u32`].
    fn write_u24(&mut self, val: u32) -> Result<()>;

    /// Writes 4 bytes to the file from a [`u32`].
    fn write_u32(&mut self, val: u32) -> Result<()>;

    /// Writes 8 bytes to the file from a [`u64`].
    fn write_u64(&mut self, val: u64) -> Result<()>;

    /// Writes a null-terminated string to the file.
    fn write_string(&mut self, str: &str) -> Result<()>;

    /// Writes a run of bytes to the file.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<W: Write> VPKFileWriter for W {
    fn write_u8(&mut self, val: u8) -> Result<()> {
        put(self, &[val])
    }

    fn write_u16(&mut self, val: u16) -> Result<()> {
        put(self, &val.to_le_bytes())
    }

    fn write_u24(&mut self, val: u32) -> Result<()> {
        put(self, &val.to_le_bytes()[..3])
    }

    fn write_u32(&mut self, val: u32) -> Result<()> {
        put(self, &val.to_le_bytes())
    }

    fn write_u64(&mut self, val: u64) -> Result<()> {
        put(self, &val.to_le_bytes())
    }

    fn write_string(&mut self, str: &str) -> Result<()> {
        put(self, str.as_bytes())?;
        put(self, &[0])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        put(self, bytes)
    }
}
