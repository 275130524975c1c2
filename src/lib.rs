//! # mmap-bitset: persistent, memory-mapped bitsets
//!
//! **`mmap-bitset`** provides a durable bit-vector backed by a single file and
//! accessed through a shared memory mapping. It is meant to be embedded as a
//! storage primitive: boolean flags addressable by large integer indices
//! ("has this entity been seen?") without a database.
//!
//! ## Key Features
//!
//! - **Growth on demand**: Addressing a bit beyond the current capacity grows the bitset to the next power of two.
//! - **Concurrent access**: [`Bitset`][crate::bitset::Bitset] is `Sync`. Reads and writes from many threads proceed without a mutex, while the mapping is replaced underneath them.
//! - **Safe remapping**: A lock-free quiescence barrier guarantees that no operation ever touches an unmapped region or a truncated part of the file.
//! - **Simple format**: A 20-byte header followed by the packed bit array. See [`header`].
//!
//! ## Basic Usage
//!
//! ```rust
//! use mmap_bitset::bitset::Bitset;
//! use mmap_bitset::options::Options;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("seen.bitset");
//!
//! // 1. Create a bitset (capacity: next power of two above `size`)
//! let bitset = Bitset::open(&path, Options::new().size(0))?;
//! assert_eq!(bitset.capacity(), 2);
//!
//! // 2. Setting a bit beyond the capacity grows the bitset
//! bitset.set(&[5])?;
//! assert_eq!(bitset.capacity(), 8);
//! assert_eq!(bitset.get(&[0, 5, 7])?, vec![0, 1, 0]);
//!
//! // 3. Bits persist across close and reopen
//! bitset.close()?;
//! let bitset = Bitset::open(&path, Options::default())?;
//! assert_eq!(bitset.get(&[5])?, vec![1]);
//!
//! // 4. Delete the backing file
//! bitset.delete()?;
//! assert!(!path.exists());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Components
//!
//! - **[`bitset`]**: The [`Bitset`][crate::bitset::Bitset] handle with open/close, get/set/unset and the resize engine.
//! - **[`quiescence`]**: Operation tracking that makes remapping and truncation safe.
//! - **[`error`]**: The error taxonomy.
//! - **[`options`]**: Open options and validation of textual input.

#[cfg(not(unix))]
compile_error!("mmap-bitset currently supports only Unix platforms.");

pub mod bitset;
pub mod error;
pub mod header;
pub mod lock;
pub mod mapping;
pub mod options;
pub mod quiescence;
pub mod utils;

pub use bitset::Bitset;
pub use error::{Error, ErrorKind, Result};
pub use options::Options;
