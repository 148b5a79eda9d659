//! Cache key derivation
//!
//! Keys are SHA-256 digests over the exact query text and its bind
//! parameters. No normalization is applied: `SELECT 1` and `select 1` are
//! different keys. Every component is type-tagged and length-prefixed so that
//! different parameter lists can never produce the same byte stream.

use crate::error::{CacheError, CacheResult};
use crate::result::SqlValue;
use chrono::SecondsFormat;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a cache key in bytes
pub const KEY_LEN: usize = 32;

/// Fixed-size cache key derived from query text and parameters
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; KEY_LEN]);

impl CacheKey {
    /// Wrap a precomputed digest
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex form, as written to logs and events
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex digits, enough to tell keys apart in log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.short())
    }
}

impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// Type tags for the digest input. Changing any of these changes every key.
const TAG_QUERY: u8 = 0x01;
const TAG_NULL: u8 = 0x10;
const TAG_BOOL: u8 = 0x11;
const TAG_INT: u8 = 0x12;
const TAG_FLOAT: u8 = 0x13;
const TAG_TEXT: u8 = 0x14;
const TAG_BYTES: u8 = 0x15;
const TAG_TIMESTAMP: u8 = 0x16;
const TAG_JSON: u8 = 0x17;

/// Maps query text plus bind parameters to a [`CacheKey`]
pub struct KeyDeriver;

impl KeyDeriver {
    /// Derive the key for a query and its ordered bind parameters
    ///
    /// Fails with [`CacheError::KeyDerivation`] when a parameter has no
    /// deterministic encoding (NaN or infinite floats). Callers treat such a
    /// query as non-cacheable.
    pub fn derive(query: &str, params: &[SqlValue]) -> CacheResult<CacheKey> {
        let mut hasher = Sha256::new();
        hasher.update([TAG_QUERY]);
        write_bytes(&mut hasher, query.as_bytes());

        hasher.update((params.len() as u64).to_le_bytes());
        for (index, param) in params.iter().enumerate() {
            write_param(&mut hasher, index, param)?;
        }

        Ok(CacheKey(hasher.finalize().into()))
    }

    /// Derive the key for a query without parameters
    pub fn derive_text(query: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update([TAG_QUERY]);
        write_bytes(&mut hasher, query.as_bytes());
        hasher.update(0u64.to_le_bytes());
        CacheKey(hasher.finalize().into())
    }
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn write_param(hasher: &mut Sha256, index: usize, param: &SqlValue) -> CacheResult<()> {
    match param {
        SqlValue::Null => hasher.update([TAG_NULL]),
        SqlValue::Bool(b) => hasher.update([TAG_BOOL, *b as u8]),
        SqlValue::Int(i) => {
            hasher.update([TAG_INT]);
            hasher.update(i.to_le_bytes());
        }
        SqlValue::Float(f) => {
            if !f.is_finite() {
                return Err(CacheError::KeyDerivation(format!(
                    "parameter ${} is a non-finite float ({})",
                    index + 1,
                    f
                )));
            }
            hasher.update([TAG_FLOAT]);
            hasher.update(f.to_bits().to_le_bytes());
        }
        SqlValue::Text(s) => {
            hasher.update([TAG_TEXT]);
            write_bytes(hasher, s.as_bytes());
        }
        SqlValue::Bytes(b) => {
            hasher.update([TAG_BYTES]);
            write_bytes(hasher, b);
        }
        SqlValue::Timestamp(ts) => {
            hasher.update([TAG_TIMESTAMP]);
            write_bytes(
                hasher,
                ts.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes(),
            );
        }
        SqlValue::Json(value) => {
            // serde_json maps are ordered, so equal documents encode equally.
            let encoded = serde_json::to_vec(value).map_err(|e| {
                CacheError::KeyDerivation(format!("parameter ${}: {}", index + 1, e))
            })?;
            hasher.update([TAG_JSON]);
            write_bytes(hasher, &encoded);
        }
    }
    Ok(())
}
