//! Content-addressed keys for cached images.
//!
//! A [`CacheKey`] is the lowercase hex SHA-256 digest of the UTF-8 bytes of a
//! source identifier (normally the image URL). It doubles as the on-disk file
//! name, so it must never change for a given identifier.

use crate::errors::CacheError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of a key in hex characters.
pub const KEY_HEX_LEN: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for `identifier`.
    #[must_use]
    pub fn derive(identifier: &str) -> Self {
        let digest = Sha256::digest(identifier.as_bytes());
        Self(digest.into())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Free-function form used by callers that only need the file name.
#[must_use]
pub fn derive_key(identifier: &str) -> CacheKey {
    CacheKey::derive(identifier)
}

impl FromStr for CacheKey {
    type Err = CacheError;

    /// Parses a file name back into a key. Uppercase hex is rejected so that a
    /// key has exactly one textual form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEY_HEX_LEN || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(CacheError::InvalidKey(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|_| CacheError::InvalidKey(s.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "CacheKey({}..)", &self.to_hex()[..12])
    }
}
