//! Index Key Encoding Helpers
//!
//! Secondary index keys are plain byte strings compared lexicographically.
//! These functions define their layout. Never build index keys inline in a
//! record type.
//!
//! # Format Conventions
//!
//! - Integers are big-endian (sorts numerically)
//! - Times are big-endian u32 seconds
//! - Account names and permlinks are raw bytes followed by a `0x00`
//!   terminator, so a shorter name sorts before any extension of it and
//!   composite keys stay prefix-free
//! - "Descending" numeric fields are stored as `MAX - value`

use crate::protocol::{AccountName, TimePointSec, TransactionId};

/// Incremental builder for composite index keys.
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder(Vec<u8>);

impl KeyBuilder {
    pub fn new() -> Self {
        Self(Vec::with_capacity(32))
    }

    pub fn bool(mut self, v: bool) -> Self {
        self.0.push(v as u8);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u128(mut self, v: u128) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Larger values sort first.
    pub fn u64_desc(self, v: u64) -> Self {
        self.u64(u64::MAX - v)
    }

    pub fn time(self, t: TimePointSec) -> Self {
        self.u32(t.secs())
    }

    pub fn str(mut self, s: &str) -> Self {
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
        self
    }

    pub fn name(self, name: &AccountName) -> Self {
        self.str(name.as_str())
    }

    pub fn trx_id(mut self, id: &TransactionId) -> Self {
        self.0.extend_from_slice(id.as_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// Index key for "everything due at or before `t`" scans.
#[inline]
pub fn time_key(t: TimePointSec) -> Vec<u8> {
    KeyBuilder::new().time(t).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_sort_prefix_first() {
        let a = KeyBuilder::new().str("abc").u32(9).build();
        let b = KeyBuilder::new().str("abcd").u32(0).build();
        assert!(a < b);
    }

    #[test]
    fn test_descending_field_inverts_order() {
        let big = KeyBuilder::new().u64_desc(100).build();
        let small = KeyBuilder::new().u64_desc(5).build();
        assert!(big < small);
    }
}
