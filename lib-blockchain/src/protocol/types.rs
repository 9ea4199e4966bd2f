//! Primitive protocol types: names, times, keys, signatures and ids.
//!
//! Digests are blake3. Keys and signatures are ed25519. Every fixed-size
//! byte type displays as lowercase hex.

use std::borrow::Borrow;
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::constants::{MAX_ACCOUNT_NAME_LENGTH, MIN_ACCOUNT_NAME_LENGTH};

/// blake3 digest of `data`.
#[inline]
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

// =============================================================================
// ACCOUNT NAMES
// =============================================================================

/// Account name. Ordering is byte-wise, which is also index order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountName(String);

impl AccountName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dot-separated segments of at least 3 characters, each starting with a
    /// lowercase letter, containing letters, digits and dashes, and ending in
    /// a letter or digit.
    pub fn is_valid(name: &str) -> bool {
        let len = name.len();
        if !(MIN_ACCOUNT_NAME_LENGTH..=MAX_ACCOUNT_NAME_LENGTH).contains(&len) {
            return false;
        }
        name.split('.').all(|segment| {
            let bytes = segment.as_bytes();
            if bytes.len() < MIN_ACCOUNT_NAME_LENGTH {
                return false;
            }
            if !bytes[0].is_ascii_lowercase() {
                return false;
            }
            let last = bytes[bytes.len() - 1];
            if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
                return false;
            }
            bytes[1..bytes.len() - 1]
                .iter()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
        })
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for AccountName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AccountName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for AccountName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AccountName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Seconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimePointSec(pub u32);

impl TimePointSec {
    pub const MINIMUM: TimePointSec = TimePointSec(0);
    pub const MAXIMUM: TimePointSec = TimePointSec(u32::MAX);

    pub fn secs(&self) -> u32 {
        self.0
    }

    /// Seconds from `earlier` to `self`, negative if `earlier` is later.
    pub fn seconds_since(&self, earlier: TimePointSec) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }
}

impl Add<u32> for TimePointSec {
    type Output = TimePointSec;

    fn add(self, rhs: u32) -> TimePointSec {
        TimePointSec(self.0.saturating_add(rhs))
    }
}

impl Sub<u32> for TimePointSec {
    type Output = TimePointSec;

    fn sub(self, rhs: u32) -> TimePointSec {
        TimePointSec(self.0.saturating_sub(rhs))
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

// =============================================================================
// KEYS AND SIGNATURES
// =============================================================================

/// ed25519 public key. All-zero bytes is the null key, which never verifies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub const NULL: PublicKey = PublicKey([0u8; 32]);

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self(key.verifying_key().to_bytes())
    }

    /// True when `signature` is a valid signature of `message` by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        if self.is_null() {
            return false;
        }
        let Ok(vk) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::from_slice(&signature.0) else {
            return false;
        };
        vk.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

/// ed25519 signature bytes.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn sign(key: &SigningKey, message: &[u8]) -> Self {
        Self(key.sign(message).to_bytes().to_vec())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0.len().min(8);
        write!(f, "Signature({})", hex::encode(&self.0[..n]))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

// =============================================================================
// IDS AND DIGESTS
// =============================================================================

macro_rules! hex_bytes {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const ZERO: $name = $name([0u8; $len]);

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut out = [0u8; $len];
                hex::decode_to_slice(s, &mut out)?;
                Ok(Self(out))
            }
        }
    };
}

hex_bytes!(BlockId, 20);
hex_bytes!(TransactionId, 20);
hex_bytes!(Checksum, 20);
hex_bytes!(ChainId, 32);
hex_bytes!(Digest, 32);

impl BlockId {
    /// Block number embedded big-endian in the first four bytes.
    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// TaPoS prefix: little-endian u32 at bytes 4..8.
    pub fn tapos_prefix(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    /// Builds an id from a header digest and the block number.
    pub fn from_digest(digest: &[u8; 32], block_num: u32) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        out[..4].copy_from_slice(&block_num.to_be_bytes());
        Self(out)
    }
}

impl ChainId {
    /// Chain id derived from a human-readable seed.
    pub fn from_seed(seed: &str) -> Self {
        Self(hash_bytes(seed.as_bytes()))
    }
}

impl Checksum {
    pub fn of(data: &[u8]) -> Self {
        let digest = hash_bytes(data);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Self(out)
    }
}

impl Digest {
    pub fn of(data: &[u8]) -> Self {
        Self(hash_bytes(data))
    }
}
