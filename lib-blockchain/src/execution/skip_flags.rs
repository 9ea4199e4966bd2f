//! Validation skip flags.
//!
//! A bitmask of checks to bypass. Replay of the local block log and blocks
//! at or below the last checkpoint run with most checks off; blocks from the
//! network run with none.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SkipFlags(u32);

impl SkipFlags {
    pub const NOTHING: SkipFlags = SkipFlags(0);
    pub const WITNESS_SIGNATURE: SkipFlags = SkipFlags(1 << 0);
    pub const TRANSACTION_SIGNATURES: SkipFlags = SkipFlags(1 << 1);
    pub const TRANSACTION_DUPE_CHECK: SkipFlags = SkipFlags(1 << 2);
    pub const FORK_DB: SkipFlags = SkipFlags(1 << 3);
    pub const BLOCK_SIZE_CHECK: SkipFlags = SkipFlags(1 << 4);
    pub const TAPOS_CHECK: SkipFlags = SkipFlags(1 << 5);
    pub const AUTHORITY_CHECK: SkipFlags = SkipFlags(1 << 6);
    pub const MERKLE_CHECK: SkipFlags = SkipFlags(1 << 7);
    pub const UNDO_HISTORY_CHECK: SkipFlags = SkipFlags(1 << 8);
    pub const WITNESS_SCHEDULE_CHECK: SkipFlags = SkipFlags(1 << 9);
    pub const VALIDATE: SkipFlags = SkipFlags(1 << 10);
    pub const VALIDATE_INVARIANTS: SkipFlags = SkipFlags(1 << 11);
    pub const UNDO_BLOCK: SkipFlags = SkipFlags(1 << 12);
    pub const BLOCK_LOG: SkipFlags = SkipFlags(1 << 13);

    /// Checks skipped for blocks at or below the last checkpoint. The merkle
    /// root is still verified.
    pub const CHECKPOINTED: SkipFlags = SkipFlags(
        Self::WITNESS_SIGNATURE.0
            | Self::TRANSACTION_SIGNATURES.0
            | Self::TRANSACTION_DUPE_CHECK.0
            | Self::BLOCK_SIZE_CHECK.0
            | Self::TAPOS_CHECK.0
            | Self::AUTHORITY_CHECK.0
            | Self::UNDO_HISTORY_CHECK.0
            | Self::WITNESS_SCHEDULE_CHECK.0
            | Self::VALIDATE.0
            | Self::VALIDATE_INVARIANTS.0,
    );

    /// Checks skipped when replaying the local block log.
    pub const REINDEX: SkipFlags = SkipFlags(
        Self::WITNESS_SIGNATURE.0
            | Self::TRANSACTION_SIGNATURES.0
            | Self::TRANSACTION_DUPE_CHECK.0
            | Self::TAPOS_CHECK.0
            | Self::MERKLE_CHECK.0
            | Self::WITNESS_SCHEDULE_CHECK.0
            | Self::AUTHORITY_CHECK.0
            | Self::VALIDATE.0
            | Self::VALIDATE_INVARIANTS.0
            | Self::BLOCK_LOG.0,
    );

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        SkipFlags(bits)
    }

    /// True when every flag in `other` is set.
    pub const fn contains(&self, other: SkipFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SkipFlags) -> Self {
        SkipFlags(self.0 | other.0)
    }

    pub const fn without(self, other: SkipFlags) -> Self {
        SkipFlags(self.0 & !other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SkipFlags {
    type Output = SkipFlags;

    fn bitor(self, rhs: SkipFlags) -> SkipFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for SkipFlags {
    fn bitor_assign(&mut self, rhs: SkipFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for SkipFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SkipFlags({:#06x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpointed_still_checks_merkle() {
        assert!(!SkipFlags::CHECKPOINTED.contains(SkipFlags::MERKLE_CHECK));
        assert!(SkipFlags::CHECKPOINTED.contains(SkipFlags::WITNESS_SIGNATURE | SkipFlags::TAPOS_CHECK));
        assert!(SkipFlags::REINDEX.contains(SkipFlags::MERKLE_CHECK));
    }

    #[test]
    fn test_without_clears_only_given_bits() {
        let flags = SkipFlags::FORK_DB | SkipFlags::VALIDATE;
        let cleared = flags.without(SkipFlags::FORK_DB);
        assert!(!cleared.contains(SkipFlags::FORK_DB));
        assert!(cleared.contains(SkipFlags::VALIDATE));
        assert!(SkipFlags::NOTHING.is_empty());
    }
}
