//! Persistent, memory-mapped bitset that grows on demand.
//!
//! A [`Bitset`] maps its backing file as one contiguous region (header
//! followed by the bit array) and lets any number of threads query and mutate
//! bits concurrently, while the backing storage is grown or shrunk
//! underneath them.
//!
//! # Concurrency
//!
//! There is no mutex around bit accesses. Instead:
//!
//! - every access brackets itself with a [`Quiescence`] guard, *then* loads
//!   the current capacity and mapping;
//! - a resize publishes the new state first and then waits for quiescence
//!   before it destroys anything an earlier access may still be using (the
//!   old mapping on grow, the truncated tail of the file on shrink);
//! - resizes (and close) are serialized by a single-writer [`ResizeLock`].
//!
//! Each bit is updated with an atomic read-modify-write on the byte holding
//! it, so concurrent writers to neighboring bits never lose updates.

use std::fmt::{self, Debug};
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::header::{size_on_disk, Header, HEADER_SIZE};
use crate::lock::{ResizeGuard, ResizeLock};
use crate::mapping::Mapping;
use crate::options::Options;
use crate::quiescence::{OperationGuard, Quiescence};
use crate::utils::{capacity_for, highest, MIN_CAPACITY};

/// Permissions of newly created bitset files.
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ResizeMode {
    /// Resize to exactly the requested capacity, shrinking if necessary.
    Exact,
    /// Only ever increase the capacity; satisfied by any capacity at least as large.
    Grow,
}

pub struct Bitset {
    path: PathBuf,
    file: File,
    /// Current mapping. Replaced (never mutated) on grow; null once closed.
    mapping: AtomicPtr<Mapping>,
    /// Capacity in bits, mirroring the `size` field of the header.
    capacity: AtomicU64,
    operations: Quiescence,
    lock: ResizeLock,
}

impl Bitset {
    /// Opens the bitset at `path`, creating it if the file is absent or empty.
    ///
    /// A new bitset holds the next power of two strictly greater than
    /// `options.size` bits (at least 2). An existing one is validated, but
    /// never modified, before it is used.
    ///
    /// # Errors
    ///
    /// - [`Error::NotABitset`] if the file has no valid bitset header
    /// - [`Error::Unsupported`] if the header has an unknown version
    /// - OS-level failures classified as described in [`Error`]
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path.as_ref();
        debug!("open(path = {}, size = {})", path.display(), options.size);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(FILE_MODE)
            .open(path)?;

        let len = file.metadata()?.len();
        let (mapping, capacity) = if len == 0 {
            Self::create(&file, options)?
        } else {
            Self::load(&file, len)?
        };
        debug!("open: {} bits in {} bytes", capacity, mapping.len());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mapping: AtomicPtr::new(Box::into_raw(Box::new(mapping))),
            capacity: AtomicU64::new(capacity),
            operations: Quiescence::new(),
            lock: ResizeLock::new(),
        })
    }

    fn create(file: &File, options: Options) -> Result<(Mapping, u64)> {
        let capacity = capacity_for(options.size).ok_or_else(Error::too_large)?;
        debug!("create: {} bits", capacity);

        let result = file.set_len(size_on_disk(capacity)).map_err(Error::from).and_then(|()| {
            let mapping = Mapping::map(file, size_on_disk(capacity))?;
            mapping.write_header(&Header::new(capacity));
            mapping.flush_header()?;
            Ok(mapping)
        });

        match result {
            Ok(mapping) => Ok((mapping, capacity)),
            Err(e) => {
                // Leave an empty file behind, so the next open creates afresh.
                if let Err(rollback) = file.set_len(0) {
                    warn!("create: failed to roll back file length: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn load(file: &File, len: u64) -> Result<(Mapping, u64)> {
        if len < HEADER_SIZE as u64 {
            return Err(Error::NotABitset);
        }
        let mapping = Mapping::map(file, len)?;
        let header = mapping.header()?;
        Ok((mapping, header.size))
    }

    /// Closes the bitset, flushing all bits to the backing file.
    ///
    /// Waits for a resize in progress and for all operations in flight.
    pub fn close(self) -> Result<()> {
        self.shutdown(false)
    }

    /// Closes the bitset and removes its backing file.
    pub fn delete(self) -> Result<()> {
        self.shutdown(true)
    }

    fn shutdown(&self, delete: bool) -> Result<()> {
        let mapping = {
            let _guard = self.lock.lock();
            let mapping = self.mapping.swap(ptr::null_mut(), Ordering::SeqCst);
            self.operations.wait();
            mapping
        };
        if mapping.is_null() {
            return Ok(());
        }
        debug!("close(path = {}, delete = {})", self.path.display(), delete);

        // SAFETY: The pointer came from `Box::into_raw` and has just been
        // unpublished; quiescence guarantees nobody still references it.
        let mapping = unsafe { Box::from_raw(mapping) };

        let mut result = Ok(());
        if !delete {
            let len = usize::try_from(size_on_disk(self.capacity())).map_or(mapping.len(), |len| len.min(mapping.len()));
            result = mapping.flush(len);
        }
        drop(mapping);

        if delete {
            fs::remove_file(&self.path)?;
        }
        result
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of addressable bits; always a power of two.
    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Number of bit operations currently in flight.
    pub fn in_flight(&self) -> u64 {
        self.operations.in_flight()
    }

    /// Current mapping, valid for as long as the operation guard lives.
    fn mapping<'g>(&self, _operation: &'g OperationGuard<'_>) -> &'g Mapping {
        let mapping = self.mapping.load(Ordering::SeqCst);
        assert!(!mapping.is_null(), "bitset is closed");
        // SAFETY: A mapping is only freed after it was unpublished and the
        // quiescence generation that was current at that point has drained.
        unsafe { &*mapping }
    }

    /// Current mapping, valid while the resize lock is held.
    fn mapping_locked<'g>(&self, _lock: &'g ResizeGuard<'_>) -> &'g Mapping {
        let mapping = self.mapping.load(Ordering::SeqCst);
        assert!(!mapping.is_null(), "bitset is closed");
        // SAFETY: Only the lock holder replaces or frees the mapping.
        unsafe { &*mapping }
    }

    /// Runs `f` over the current mapping once the capacity covers every index.
    ///
    /// The whole batch observes a single capacity and a single mapping. If
    /// growing fails, no bit is touched.
    fn access<R>(&self, indices: &[u64], f: impl FnOnce(&Mapping) -> R) -> Result<R> {
        let highest = highest(indices);
        loop {
            let operation = self.operations.begin();
            let capacity = self.capacity.load(Ordering::SeqCst);
            if highest.map_or(true, |h| h < capacity) {
                return Ok(f(self.mapping(&operation)));
            }
            // A resize waits for us, so never hold the guard across it.
            drop(operation);
            self.grow_if_necessary(indices)?;
        }
    }

    /// Returns the state (`0` or `1`) of each bit, in order.
    pub fn get(&self, indices: &[u64]) -> Result<Vec<u8>> {
        self.access(indices, |mapping| {
            trace!("get: {} bits", indices.len());
            indices.iter().map(|&i| mapping.get(i) as u8).collect()
        })
    }

    /// Sets each bit.
    pub fn set(&self, indices: &[u64]) -> Result<()> {
        self.access(indices, |mapping| {
            trace!("set: {} bits", indices.len());
            for &i in indices {
                mapping.set(i);
            }
        })
    }

    /// Clears each bit.
    pub fn unset(&self, indices: &[u64]) -> Result<()> {
        self.access(indices, |mapping| {
            trace!("unset: {} bits", indices.len());
            for &i in indices {
                mapping.unset(i);
            }
        })
    }

    /// Grows the bitset so that it can address the highest of `indices`.
    ///
    /// The new capacity is the next power of two strictly greater than the
    /// highest index. Never shrinks: a concurrent grow to a larger capacity
    /// satisfies the request.
    pub fn grow_if_necessary(&self, indices: &[u64]) -> Result<()> {
        let Some(highest) = highest(indices) else {
            return Ok(());
        };
        let capacity = self.capacity();
        if highest < capacity {
            return Ok(());
        }

        let bits = capacity_for(highest).ok_or_else(Error::too_large)?;
        trace!("grow_if_necessary: highest = {}, capacity = {} -> {}", highest, capacity, bits);
        self.resize_with(bits, ResizeMode::Grow)
    }

    /// Grows or shrinks the bitset to hold exactly `bits` bits.
    ///
    /// Shrinking discards every bit at index `bits` or above. Resizing to the
    /// current capacity is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not a power of two, or is less than 2.
    pub fn resize(&self, bits: u64) -> Result<()> {
        assert!(bits.is_power_of_two(), "capacity must be a power of two, got {}", bits);
        assert!(bits >= MIN_CAPACITY, "capacity must be at least {}, got {}", MIN_CAPACITY, bits);
        self.resize_with(bits, ResizeMode::Exact)
    }

    fn resize_with(&self, bits: u64, mode: ResizeMode) -> Result<()> {
        loop {
            if self.is_satisfied(bits, mode) {
                trace!("resize: skipped, capacity is already {}", self.capacity());
                return Ok(());
            }

            let Some(guard) = self.lock.try_lock() else {
                trace!("resize: waiting on another resize");
                self.lock.wait_unlocked();
                continue;
            };

            // Someone else may have finished a resize just before we locked.
            if self.is_satisfied(bits, mode) {
                return Ok(());
            }
            return self.resize_locked(&guard, bits);
        }
    }

    fn is_satisfied(&self, bits: u64, mode: ResizeMode) -> bool {
        let capacity = self.capacity();
        match mode {
            ResizeMode::Exact => capacity == bits,
            ResizeMode::Grow => capacity >= bits,
        }
    }

    fn resize_locked(&self, guard: &ResizeGuard<'_>, bits: u64) -> Result<()> {
        let current = self.capacity();
        if bits < current {
            self.shrink_locked(guard, current, bits)
        } else {
            self.grow_locked(guard, current, bits)
        }
    }

    fn shrink_locked(&self, guard: &ResizeGuard<'_>, current: u64, bits: u64) -> Result<()> {
        debug!("resize: shrinking {} -> {} bits", current, bits);
        let mapping = self.mapping_locked(guard);

        // Advertise the smaller size before anything is truncated, so that
        // no operation starting from now on addresses the tail.
        mapping.write_header(&Header::new(bits));
        if let Err(e) = mapping.flush_header() {
            mapping.write_header(&Header::new(current));
            return Err(e);
        }
        self.capacity.store(bits, Ordering::SeqCst);
        self.operations.wait();

        // The larger mapping stays in place; nothing addresses beyond `bits`.
        self.file.set_len(size_on_disk(bits))?;
        debug!("resize: done");
        Ok(())
    }

    fn grow_locked(&self, guard: &ResizeGuard<'_>, current: u64, bits: u64) -> Result<()> {
        debug!("resize: growing {} -> {} bits", current, bits);
        let len = size_on_disk(bits);

        self.file.set_len(len)?;
        let mapping = Box::new(Mapping::map(&self.file, len)?);

        // From here on, new operations use the new mapping. Operations in
        // flight keep the old one until they complete.
        let old = self.mapping.swap(Box::into_raw(mapping), Ordering::SeqCst);
        self.operations.wait();
        // SAFETY: `old` came from `Box::into_raw`; the wait above drained
        // every operation that could have loaded it.
        drop(unsafe { Box::from_raw(old) });

        // Until the header is durable the old capacity stays in effect; the
        // larger file and mapping are harmless and reused by the next grow.
        let mapping = self.mapping_locked(guard);
        mapping.write_header(&Header::new(bits));
        if let Err(e) = mapping.flush_header() {
            mapping.write_header(&Header::new(current));
            return Err(e);
        }
        self.capacity.store(bits, Ordering::SeqCst);
        debug!("resize: done");
        Ok(())
    }

    #[cfg(test)]
    fn begin_operation(&self) -> OperationGuard<'_> {
        self.operations.begin()
    }

    #[cfg(test)]
    fn mapping_ptr(&self) -> *const Mapping {
        self.mapping.load(Ordering::SeqCst)
    }
}

impl Drop for Bitset {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(false) {
            warn!("failed to close bitset at {}: {}", self.path.display(), e);
        }
    }
}

impl Debug for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitset")
            .field("path", &self.path)
            .field("capacity", &self.capacity())
            .field("in_flight", &self.in_flight())
            .field("resizing", &self.lock.is_locked())
            .finish()
    }
}
