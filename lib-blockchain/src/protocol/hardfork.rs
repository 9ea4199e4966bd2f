//! Software and hardfork versions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{BLOCKCHAIN_HARDFORK_VERSION, NUM_HARDFORKS};
use super::types::TimePointSec;

/// Software version reported by witnesses: `major.hardfork.release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub hardfork: u8,
    pub release: u16,
}

impl Version {
    pub const fn new(major: u8, hardfork: u8, release: u16) -> Self {
        Self {
            major,
            hardfork,
            release,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.hardfork, self.release)
    }
}

/// A version with the release component fixed at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct HardforkVersion {
    pub major: u8,
    pub hardfork: u8,
}

impl HardforkVersion {
    pub const fn new(major: u8, hardfork: u8) -> Self {
        Self { major, hardfork }
    }

    pub const fn as_version(&self) -> Version {
        Version::new(self.major, self.hardfork, 0)
    }
}

impl From<Version> for HardforkVersion {
    fn from(v: Version) -> Self {
        Self::new(v.major, v.hardfork)
    }
}

impl fmt::Display for HardforkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.hardfork)
    }
}

impl PartialEq<Version> for HardforkVersion {
    fn eq(&self, other: &Version) -> bool {
        self.as_version() == *other
    }
}

impl PartialOrd<Version> for HardforkVersion {
    fn partial_cmp(&self, other: &Version) -> Option<std::cmp::Ordering> {
        Some(self.as_version().cmp(other))
    }
}

/// Activation time and version for each hardfork number known to this binary.
///
/// Index 0 is genesis. The table is node configuration, not ledger state:
/// the ledger only records which hardforks have been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardforkSchedule {
    pub times: Vec<TimePointSec>,
    pub versions: Vec<HardforkVersion>,
}

impl HardforkSchedule {
    /// Builds the table from the genesis time and one activation time per
    /// hardfork. Missing entries never activate by time.
    pub fn new(genesis_time: TimePointSec, hardfork_times: &[u32]) -> Self {
        let n = NUM_HARDFORKS as usize + 1;
        let mut times = Vec::with_capacity(n);
        let mut versions = Vec::with_capacity(n);
        times.push(genesis_time);
        versions.push(HardforkVersion::new(0, 0));
        for i in 1..n {
            let t = hardfork_times
                .get(i - 1)
                .copied()
                .map(TimePointSec)
                .unwrap_or(TimePointSec::MAXIMUM);
            times.push(t);
            versions.push(HardforkVersion::new(0, i as u8));
        }
        debug_assert_eq!(versions[NUM_HARDFORKS as usize], BLOCKCHAIN_HARDFORK_VERSION);
        Self { times, versions }
    }

    pub fn time(&self, hardfork: u32) -> TimePointSec {
        self.times
            .get(hardfork as usize)
            .copied()
            .unwrap_or(TimePointSec::MAXIMUM)
    }

    pub fn version(&self, hardfork: u32) -> HardforkVersion {
        self.versions
            .get(hardfork as usize)
            .copied()
            .unwrap_or(BLOCKCHAIN_HARDFORK_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardfork_version_orders_against_version() {
        let hf = HardforkVersion::new(0, 4);
        assert!(hf < Version::new(0, 4, 1));
        assert!(hf == Version::new(0, 4, 0));
        assert!(hf > Version::new(0, 3, 99));
    }

    #[test]
    fn test_schedule_fills_missing_times_with_never() {
        let s = HardforkSchedule::new(TimePointSec(100), &[200, 300]);
        assert_eq!(s.time(0), TimePointSec(100));
        assert_eq!(s.time(2), TimePointSec(300));
        assert_eq!(s.time(3), TimePointSec::MAXIMUM);
        assert_eq!(s.version(6), HardforkVersion::new(0, 6));
    }
}
