use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string, HEX_DECODE};
use crate::HashError;

/// Length in bytes of the digest this crate identifies objects with.
pub const DIGEST_LEN: usize = 20;
/// Length in hex characters of the full digest.
pub const HEX_LEN: usize = DIGEST_LEN * 2;

/// A git object identifier: the 20-byte SHA-1 digest of an object's
/// canonical, header-prefixed serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; DIGEST_LEN]);

impl ObjectId {
    /// The null OID (all zeros).
    pub const NULL: Self = Self([0u8; DIGEST_LEN]);

    /// Create an ObjectId from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != DIGEST_LEN {
            return Err(HashError::InvalidHashLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create an ObjectId from a raw 20-byte array.
    pub const fn from_array(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != HEX_LEN {
            return Err(HashError::InvalidHexLength {
                expected: HEX_LEN,
                actual: hex.len(),
            });
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Get the raw 20 bytes of the digest.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Check if this is the null (all-zeros) OID.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Get the hex string representation (lowercase).
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// Get the first byte of the digest (used for fan-out table indexing).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Get the loose object path component: `"xx/xxxx..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }

    /// Canonical-length comparison of a partial hex digest against a full one.
    ///
    /// `canonical_len` is the number of hex characters in the partial prefix.
    /// Comparison proceeds full-byte for `canonical_len / 2` bytes, plus, if
    /// `canonical_len` is odd, the high nibble of the following byte.
    pub fn canonical_eq(canonical_len: usize, partial_hex: &str, full: &ObjectId) -> bool {
        let full_hex = full.to_hex();
        if partial_hex.len() < canonical_len || full_hex.len() < canonical_len {
            return false;
        }
        partial_hex
            .as_bytes()
            .iter()
            .zip(full_hex.as_bytes().iter())
            .take(canonical_len)
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    }

    /// Check whether `partial_bytes` (zero-padded to 20 bytes) matches this
    /// digest up to `canonical_len` hex characters.
    pub fn matches_partial(&self, partial_bytes: &[u8; DIGEST_LEN], canonical_len: usize) -> bool {
        let full_bytes = canonical_len / 2;
        if self.0[..full_bytes] != partial_bytes[..full_bytes] {
            return false;
        }
        if canonical_len % 2 == 1 {
            let self_hi = self.0[full_bytes] >> 4;
            let partial_hi = partial_bytes[full_bytes] >> 4;
            if self_hi != partial_hi {
                return false;
            }
        }
        true
    }
}

/// Parse a partial hex digest into zero-padded 20 bytes plus its canonical
/// length (in hex characters). Validates hex characters but not length bounds.
pub fn parse_partial_hex(partial: &str) -> Result<([u8; DIGEST_LEN], usize), HashError> {
    let mut bytes = [0u8; DIGEST_LEN];
    let chars: Vec<u8> = partial.bytes().collect();
    for (i, pair) in chars.chunks(2).enumerate() {
        if i >= DIGEST_LEN {
            break;
        }
        let hi = HEX_DECODE[pair[0] as usize];
        if hi == 255 {
            return Err(HashError::InvalidHex {
                position: i * 2,
                character: pair[0] as char,
            });
        }
        if pair.len() == 2 {
            let lo = HEX_DECODE[pair[1] as usize];
            if lo == 255 {
                return Err(HashError::InvalidHex {
                    position: i * 2 + 1,
                    character: pair[1] as char,
                });
            }
            bytes[i] = (hi << 4) | lo;
        } else {
            bytes[i] = hi << 4;
        }
    }
    Ok((bytes, partial.len()))
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
