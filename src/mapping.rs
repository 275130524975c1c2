//! Immutable descriptor of one memory mapping of a bitset file.
//!
//! A [`Mapping`] is never resized or moved: growing a bitset creates a new
//! mapping and retires the old one as a whole. Dropping a mapping unmaps it.

use std::fmt::{self, Debug};
use std::fs::File;
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};

pub struct Mapping {
    mmap: MmapMut,
    /// Base address, captured once so that shared access never needs `&mut`.
    base: *mut u8,
    len: usize,
}

// SAFETY: All writes through `base` go either through atomics (bits) or
// happen under the resize lock while no reader looks at the same bytes
// (header).
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Maps the first `len` bytes of `file`, shared and writable.
    pub fn map(file: &File, len: u64) -> Result<Self> {
        let len = usize::try_from(len).map_err(|_| Error::too_large())?;
        assert!(len >= HEADER_SIZE, "mapping must cover the header");

        // SAFETY: The mapping is backed by a file we keep open; concurrent
        // modification by other processes is accepted file-mapping semantics.
        let mut mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };
        let base = mmap.as_mut_ptr();

        Ok(Self { mmap, base, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Decodes and validates the header against the mapped length.
    ///
    /// Only meaningful while nobody else writes the header, i.e. during open.
    pub fn header(&self) -> Result<Header> {
        Header::decode(&self.mmap[..])
    }

    /// Overwrites the header in memory. Caller must hold the resize lock.
    pub fn write_header(&self, header: &Header) {
        let bytes = header.encode();
        // SAFETY: `len >= HEADER_SIZE`; header bytes are only written under
        // the resize lock and never read by bit operations.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.base, HEADER_SIZE) };
    }

    /// Synchronously flushes the header to the backing file.
    pub fn flush_header(&self) -> Result<()> {
        Ok(self.mmap.flush_range(0, HEADER_SIZE)?)
    }

    /// Synchronously flushes the first `len` bytes to the backing file.
    pub fn flush(&self, len: usize) -> Result<()> {
        assert!(len <= self.len);
        Ok(self.mmap.flush_range(0, len)?)
    }

    /// Byte holding bit `index`, with the mask selecting it.
    #[inline]
    fn locate(&self, index: u64) -> (&AtomicU8, u8) {
        let offset = usize::try_from(index / 8)
            .ok()
            .and_then(|byte| byte.checked_add(HEADER_SIZE))
            .filter(|&offset| offset < self.len);
        let Some(offset) = offset else {
            panic!("bit {} is outside of the mapping ({} bytes)", index, self.len);
        };
        let mask = 1u8 << (index % 8);
        // SAFETY: `offset < len`; `AtomicU8` has the layout and alignment of `u8`.
        let byte = unsafe { &*(self.base.add(offset) as *const AtomicU8) };
        (byte, mask)
    }

    // Bit accesses need atomicity, not ordering: the quiescence counters
    // order them against remaps.

    #[inline]
    pub fn get(&self, index: u64) -> bool {
        let (byte, mask) = self.locate(index);
        byte.load(Ordering::Relaxed) & mask != 0
    }

    #[inline]
    pub fn set(&self, index: u64) {
        let (byte, mask) = self.locate(index);
        byte.fetch_or(mask, Ordering::Relaxed);
    }

    #[inline]
    pub fn unset(&self, index: u64) {
        let (byte, mask) = self.locate(index);
        byte.fetch_and(!mask, Ordering::Relaxed);
    }
}

impl Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use test_log::test;

    use super::*;
    use crate::header::size_on_disk;

    fn mapped(bits: u64) -> (File, Mapping) {
        let file = tempfile::tempfile().unwrap();
        file.set_len(size_on_disk(bits)).unwrap();
        let mapping = Mapping::map(&file, size_on_disk(bits)).unwrap();
        (file, mapping)
    }

    #[test]
    fn test_bits() {
        let (_file, mapping) = mapped(128);
        assert!(!mapping.get(70));
        mapping.set(70);
        assert!(mapping.get(70));
        assert!(!mapping.get(69));
        assert!(!mapping.get(71));
        mapping.unset(70);
        assert!(!mapping.get(70));
    }

    #[test]
    fn test_word_layout() {
        let (mut file, mapping) = mapped(128);
        mapping.write_header(&Header::new(128));
        mapping.set(0);
        mapping.set(9);
        mapping.set(64 + 63);
        mapping.flush(mapping.len()).unwrap();

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut bytes).unwrap();

        let word = |i: usize| {
            let start = HEADER_SIZE + i * 8;
            u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap())
        };
        assert_eq!(word(0), (1 << 0) | (1 << 9));
        assert_eq!(word(1), 1 << 63);
    }

    #[test]
    fn test_header_round_trip() {
        let (_file, mapping) = mapped(64);
        mapping.write_header(&Header::new(64));
        mapping.flush_header().unwrap();
        assert_eq!(mapping.header().unwrap(), Header::new(64));
    }

    #[test]
    #[should_panic(expected = "outside of the mapping")]
    fn test_out_of_bounds() {
        let (_file, mapping) = mapped(8);
        mapping.get(8);
    }
}
