//! Cache Keys and Entry Streams
//!
//! The host identifies artifacts by an opaque fingerprint and moves their
//! bodies through two narrow capabilities: an [`EntryReader`] that consumes
//! a loaded body and an [`EntryWriter`] that produces a body to store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

// =============================================================================
// Cache Key
// =============================================================================

/// Fingerprint of an artifact as computed by the host
///
/// The cache never parses the hash; it is used verbatim as the Redis key.
pub trait BuildCacheKey {
    fn hash_code(&self) -> &str;

    /// Human-readable name for logs
    fn display_name(&self) -> &str {
        self.hash_code()
    }
}

impl BuildCacheKey for str {
    fn hash_code(&self) -> &str {
        self
    }
}

impl<K: BuildCacheKey + ?Sized> BuildCacheKey for &K {
    fn hash_code(&self) -> &str {
        (**self).hash_code()
    }
}

impl BuildCacheKey for String {
    fn hash_code(&self) -> &str {
        self
    }
}

/// Owned cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl BuildCacheKey for CacheKey {
    fn hash_code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(hash: &str) -> Self {
        Self::new(hash)
    }
}

// =============================================================================
// Entry Streams
// =============================================================================

/// Host-side consumer of a loaded artifact body
pub trait EntryReader {
    fn read_from(&mut self, input: &mut dyn Read) -> io::Result<()>;
}

/// Host-side producer of an artifact body to store
pub trait EntryWriter {
    fn write_to(&mut self, output: &mut dyn Write) -> io::Result<()>;
}

/// Collects the loaded body in memory
impl EntryReader for Vec<u8> {
    fn read_from(&mut self, input: &mut dyn Read) -> io::Result<()> {
        input.read_to_end(self)?;
        Ok(())
    }
}

impl EntryWriter for Bytes {
    fn write_to(&mut self, output: &mut dyn Write) -> io::Result<()> {
        output.write_all(&self[..])
    }
}

impl EntryWriter for &[u8] {
    fn write_to(&mut self, output: &mut dyn Write) -> io::Result<()> {
        output.write_all(*self)
    }
}

/// Streams the loaded body into any writer (a file, stdout, ...)
pub struct CopyInto<W>(pub W);

impl<W: Write> EntryReader for CopyInto<W> {
    fn read_from(&mut self, input: &mut dyn Read) -> io::Result<()> {
        io::copy(input, &mut self.0)?;
        self.0.flush()
    }
}

/// Streams the body to store out of any reader
pub struct CopyFrom<R>(pub R);

impl<R: Read> EntryWriter for CopyFrom<R> {
    fn write_to(&mut self, output: &mut dyn Write) -> io::Result<()> {
        io::copy(&mut self.0, output)?;
        Ok(())
    }
}
