//! Program and artifact digests
//!
//! A cache is only reusable against the exact base program it was built
//! from, so caches and diffs carry the BLAKE3 digest of that text. Digests are
//! stored as lowercase hex in sidecars and diff headers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

const DIGEST_LEN: usize = blake3::OUT_LEN;

/// BLAKE3 digest of a program text or a written artifact
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// Digest of `data`
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Digest of a file, streamed
    ///
    /// # Errors
    /// Returns the IO error if the file cannot be opened or read
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }

    /// First 16 hex digits, for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.trim(), &mut digest)?;
        Ok(Self(digest))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DigestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

/// A stored digest that is not 64 hex digits
#[derive(Debug, thiserror::Error)]
#[error("malformed digest: {0}")]
pub struct DigestError(#[from] hex::FromHexError);
