//! Error taxonomy for bitset operations.
//!
//! Every OS-level failure is classified once, at the point where it happens,
//! into one of the [`ErrorKind`]s. The underlying [`io::Error`] is kept as the
//! error source.

use std::fmt;
use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Payload-free discriminant of an [`Error`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    NotABitset,
    Unsupported,
    Permissions,
    OutOfMemory,
    OutOfStorage,
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case name, suitable for wire protocols and logs.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NotABitset => "not_a_bitset",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Permissions => "permissions",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::OutOfStorage => "out_of_storage",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Process exit code for command-line front-ends.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::NotABitset => 2,
            ErrorKind::Unsupported => 3,
            ErrorKind::Permissions => 4,
            ErrorKind::OutOfMemory => 5,
            ErrorKind::OutOfStorage => 6,
            ErrorKind::Unknown => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors returned by [`Bitset`][crate::bitset::Bitset] operations.
#[derive(Debug)]
pub enum Error {
    /// The file does not start with a valid bitset header.
    NotABitset,
    /// The file is a bitset, but of a format version this crate does not read.
    Unsupported { version: u64 },
    /// The OS denied access.
    Permissions(io::Error),
    /// Mapping or allocation failed due to memory or address-space pressure.
    OutOfMemory(io::Error),
    /// Disk space, quota or a file-size limit is exhausted.
    OutOfStorage(io::Error),
    /// Any other OS-level failure.
    Unknown(io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotABitset => ErrorKind::NotABitset,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Permissions(_) => ErrorKind::Permissions,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::OutOfStorage(_) => ErrorKind::OutOfStorage,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// See [`ErrorKind::name`].
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// See [`ErrorKind::exit_code`].
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Error for a capacity that cannot be represented on this platform.
    pub(crate) fn too_large() -> Self {
        Error::OutOfStorage(io::Error::from_raw_os_error(libc::EFBIG))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotABitset => write!(f, "not a bitset"),
            Error::Unsupported { version } => write!(f, "unsupported bitset version {}", version),
            Error::Permissions(e) => write!(f, "permission denied: {}", e),
            Error::OutOfMemory(e) => write!(f, "out of memory: {}", e),
            Error::OutOfStorage(e) => write!(f, "out of storage: {}", e),
            Error::Unknown(e) => write!(f, "unknown error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotABitset | Error::Unsupported { .. } => None,
            Error::Permissions(e) | Error::OutOfMemory(e) | Error::OutOfStorage(e) | Error::Unknown(e) => Some(e),
        }
    }
}

/// Classifies an OS-level failure by its errno.
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) | Some(libc::EROFS) => Error::Permissions(e),
            Some(libc::ENOMEM) | Some(libc::EOVERFLOW) => Error::OutOfMemory(e),
            Some(libc::EFBIG) | Some(libc::ENOSPC) | Some(libc::EDQUOT) => Error::OutOfStorage(e),
            _ => match e.kind() {
                io::ErrorKind::PermissionDenied => Error::Permissions(e),
                io::ErrorKind::OutOfMemory => Error::OutOfMemory(e),
                _ => Error::Unknown(e),
            },
        }
    }
}
