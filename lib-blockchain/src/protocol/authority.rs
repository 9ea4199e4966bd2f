//! Weighted-threshold authorities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{AccountName, PublicKey};

pub type Weight = u16;

/// A threshold over weighted keys and weighted accounts. An account member
/// is satisfied by that account's own authority of the same class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountName, Weight>,
    pub key_auths: BTreeMap<PublicKey, Weight>,
}

impl Authority {
    pub fn new(weight_threshold: u32) -> Self {
        Self {
            weight_threshold,
            ..Default::default()
        }
    }

    /// Single-key authority with threshold 1.
    pub fn from_key(key: PublicKey) -> Self {
        let mut auth = Self::new(1);
        auth.add_key(key, 1);
        auth
    }

    pub fn add_key(&mut self, key: PublicKey, weight: Weight) -> &mut Self {
        self.key_auths.insert(key, weight);
        self
    }

    pub fn add_account(&mut self, account: AccountName, weight: Weight) -> &mut Self {
        self.account_auths.insert(account, weight);
        self
    }

    pub fn num_auths(&self) -> usize {
        self.account_auths.len() + self.key_auths.len()
    }

    /// True when no combination of members can reach the threshold.
    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| *w as u64)
            .sum();
        total < self.weight_threshold as u64
    }

    /// Stateless checks: every account member has a valid name.
    pub fn validate(&self) -> Result<(), String> {
        for name in self.account_auths.keys() {
            if !AccountName::is_valid(name.as_str()) {
                return Err(format!("invalid account name in authority: {name}"));
            }
        }
        Ok(())
    }
}

/// Authority class requested by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthorityClass {
    Owner,
    Active,
    Posting,
}

impl std::fmt::Display for AuthorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuthorityClass::Owner => "owner",
            AuthorityClass::Active => "active",
            AuthorityClass::Posting => "posting",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impossible_when_weights_below_threshold() {
        let mut auth = Authority::new(3);
        auth.add_key(PublicKey([1; 32]), 1)
            .add_account(AccountName::from("alice"), 1);
        assert!(auth.is_impossible());
        auth.add_key(PublicKey([2; 32]), 1);
        assert!(!auth.is_impossible());
        assert_eq!(auth.num_auths(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_member_name() {
        let mut auth = Authority::new(1);
        auth.add_account(AccountName::from("Bad"), 1);
        assert!(auth.validate().is_err());
    }
}
