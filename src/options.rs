//! Options for opening a bitset, and parsing of textual input.
//!
//! The parsers validate untrusted input (command lines, RPC fields) before it
//! reaches the core, which only ever sees well-formed `u64` indices.

use std::fmt;

/// Configuration for [`Bitset::open`][crate::bitset::Bitset::open].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Options {
    /// Minimum number of bits a newly created bitset must hold.
    ///
    /// Ignored when opening an existing bitset.
    pub size: u64,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Parses a list of `key=value` pairs.
    ///
    /// ```
    /// use mmap_bitset::options::Options;
    ///
    /// let options = Options::parse(["size=1000"]).unwrap();
    /// assert_eq!(options.size, 1000);
    /// assert!(Options::parse(["color=red"]).is_err());
    /// ```
    pub fn parse<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        for pair in pairs {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(OptionsError::Malformed(pair.to_string()));
            };
            match key.trim() {
                "size" => {
                    options.size = value
                        .trim()
                        .parse()
                        .map_err(|_| OptionsError::InvalidSize(value.to_string()))?;
                }
                other => return Err(OptionsError::Unknown(other.to_string())),
            }
        }
        Ok(options)
    }
}

/// Parses bit indices, rejecting anything that is not a non-negative integer.
pub fn parse_indices<'a>(items: impl IntoIterator<Item = &'a str>) -> Result<Vec<u64>, OptionsError> {
    items
        .into_iter()
        .map(|s| s.trim().parse().map_err(|_| OptionsError::InvalidIndex(s.to_string())))
        .collect()
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OptionsError {
    /// A pair without `=`.
    Malformed(String),
    /// An option this crate does not know.
    Unknown(String),
    /// `size` is not a non-negative integer.
    InvalidSize(String),
    /// An index is not a non-negative integer.
    InvalidIndex(String),
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::Malformed(s) => write!(f, "expected `key=value`, got `{}`", s),
            OptionsError::Unknown(s) => write!(f, "unknown option `{}`", s),
            OptionsError::InvalidSize(s) => write!(f, "expected `size` to be a non-negative integer, got `{}`", s),
            OptionsError::InvalidIndex(s) => write!(f, "expected index to be a non-negative integer, got `{}`", s),
        }
    }
}

impl std::error::Error for OptionsError {}
