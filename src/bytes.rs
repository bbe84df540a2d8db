//! Fixed-width integer reads and C-string scanning.
//!
//! The byte order of a Mach-O file is discovered from its magic number at
//! parse time, so scalar reads dispatch on a runtime [`ByteOrder`] value.
//! NUL scanning uses `memchr` (SIMD-accelerated on x86-64 and ARM64).

use std::fmt;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Byte order of a Mach-O file, determined by its magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// Reads a u16 from the start of the slice.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() < 2`.
    #[inline]
    pub fn read_u16(self, data: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => LittleEndian::read_u16(data),
            ByteOrder::Big => BigEndian::read_u16(data),
        }
    }

    /// Reads a u32 from the start of the slice.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() < 4`.
    #[inline]
    pub fn read_u32(self, data: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => LittleEndian::read_u32(data),
            ByteOrder::Big => BigEndian::read_u32(data),
        }
    }

    /// Reads a u64 from the start of the slice.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() < 8`.
    #[inline]
    pub fn read_u64(self, data: &[u8]) -> u64 {
        match self {
            ByteOrder::Little => LittleEndian::read_u64(data),
            ByteOrder::Big => BigEndian::read_u64(data),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => f.write_str("LittleEndian"),
            ByteOrder::Big => f.write_str("BigEndian"),
        }
    }
}

/// Reads a NUL-terminated string from the start of the slice.
///
/// An unterminated slice yields the whole slice. Invalid UTF-8 is replaced
/// lossily, matching how linkers treat these fields (raw bytes).
pub fn cstring(data: &[u8]) -> String {
    let end = memchr::memchr(0, data).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
