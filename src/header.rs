//! On-disk layout of a bitset file.
//!
//! ```text
//! offset 0:  4 bytes  magic      = "BITS"
//! offset 4:  8 bytes  version    = 1
//! offset 12: 8 bytes  size       = capacity in bits (power of two)
//! offset 20: N bytes  bit array  = ceil(size / 8) bytes
//! ```
//!
//! Integers are stored little-endian. The bit array is a sequence of
//! little-endian 64-bit words: bit `i` lives in word `i / 64` at position
//! `i % 64`, which is byte `i / 8`, bit `i % 8`.

use crate::error::{Error, Result};
use crate::utils::bits_to_bytes;

/// File tag identifying a bitset.
pub const MAGIC: [u8; 4] = *b"BITS";

/// The only format version this crate reads and writes.
pub const VERSION: u64 = 1;

pub const MAGIC_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 4;
pub const SIZE_OFFSET: usize = 12;

/// Size of the header in bytes; the bit array starts right after it.
pub const HEADER_SIZE: usize = 20;

const _: () = {
    assert!(VERSION_OFFSET == MAGIC_OFFSET + MAGIC.len());
    assert!(SIZE_OFFSET == VERSION_OFFSET + 8);
    assert!(HEADER_SIZE == SIZE_OFFSET + 8);
};

/// Number of bytes a bitset holding `bits` bits occupies on disk.
///
/// The in-memory mapping always has the same size.
pub fn size_on_disk(bits: u64) -> u64 {
    HEADER_SIZE as u64 + bits_to_bytes(bits)
}

/// Decoded header fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub version: u64,
    /// Capacity in bits.
    pub size: u64,
}

impl Header {
    pub fn new(size: u64) -> Self {
        Self { version: VERSION, size }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[MAGIC_OFFSET..VERSION_OFFSET].copy_from_slice(&MAGIC);
        bytes[VERSION_OFFSET..SIZE_OFFSET].copy_from_slice(&self.version.to_le_bytes());
        bytes[SIZE_OFFSET..HEADER_SIZE].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }

    /// Parses and validates the header at the start of `bytes`.
    ///
    /// Checks, in order: length and magic ([`Error::NotABitset`]), version
    /// ([`Error::Unsupported`]), and that `size` is a power of two whose bit
    /// array fits into `bytes` ([`Error::NotABitset`]).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || bytes[MAGIC_OFFSET..VERSION_OFFSET] != MAGIC {
            return Err(Error::NotABitset);
        }

        let version = read_u64(bytes, VERSION_OFFSET);
        if version != VERSION {
            return Err(Error::Unsupported { version });
        }

        let size = read_u64(bytes, SIZE_OFFSET);
        if !size.is_power_of_two() || size_on_disk(size) > bytes.len() as u64 {
            return Err(Error::NotABitset);
        }

        Ok(Self { version, size })
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}
