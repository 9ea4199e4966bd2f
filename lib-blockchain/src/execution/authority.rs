//! Authority verification.
//!
//! Decides whether a set of verified signing keys satisfies every authority
//! a transaction requires.
//!
//! # Rules
//!
//! ```text
//! owner   required  ->  owner authority
//! active  required  ->  active, or else owner
//! posting required  ->  posting, or else active, or else owner
//! other   required  ->  the literal authority
//! ```
//!
//! An account member of an authority is satisfied by that account's own
//! authority (posting members by posting, everything else by active), up
//! to `MAX_SIG_CHECK_DEPTH` levels deep. Every account authority looked up
//! counts against `MAX_SIG_CHECK_ACCOUNTS`.
//!
//! # Invariants
//!
//! - Posting authority never mixes with active, owner or other authority
//! - Every provided key must contribute to some satisfied authority

use std::collections::BTreeSet;

use tracing::debug;

use super::errors::{TxApplyError, TxApplyResult};
use crate::protocol::constants::{MAX_SIG_CHECK_ACCOUNTS, MAX_SIG_CHECK_DEPTH};
use crate::protocol::{AccountName, Authority, AuthorityClass, PublicKey, RequiredAuthorities};
use crate::storage::objects::AccountAuthority;
use crate::storage::ChainState;

/// Signature state for one authority check.
pub struct SignState<'a> {
    state: &'a ChainState,
    keys: &'a BTreeSet<PublicKey>,
    /// Keys that satisfied at least one authority.
    used: BTreeSet<PublicKey>,
    /// Accounts already proven, by lookup class.
    approved: BTreeSet<(AccountName, AuthorityClass)>,
    max_depth: u32,
    checks: u32,
}

impl<'a> SignState<'a> {
    pub fn new(state: &'a ChainState, keys: &'a BTreeSet<PublicKey>) -> Self {
        Self {
            state,
            keys,
            used: BTreeSet::new(),
            approved: BTreeSet::new(),
            max_depth: MAX_SIG_CHECK_DEPTH,
            checks: 0,
        }
    }

    fn lookup(&mut self, account: &AccountName) -> TxApplyResult<Option<&'a AccountAuthority>> {
        self.checks += 1;
        if self.checks > MAX_SIG_CHECK_ACCOUNTS {
            return Err(TxApplyError::TooManySignatureChecks {
                max: MAX_SIG_CHECK_ACCOUNTS,
            });
        }
        Ok(self.state.account_authorities.get(account))
    }

    /// True when `auth` reaches its threshold. Account members are looked
    /// up with `member_class`.
    pub fn check_authority(
        &mut self,
        auth: &Authority,
        member_class: AuthorityClass,
        depth: u32,
    ) -> TxApplyResult<bool> {
        let threshold = auth.weight_threshold as u64;
        let mut total: u64 = 0;

        for (key, weight) in &auth.key_auths {
            if self.keys.contains(key) {
                self.used.insert(*key);
                total += *weight as u64;
                if total >= threshold {
                    return Ok(true);
                }
            }
        }

        for (member, weight) in &auth.account_auths {
            let proven = if self.approved.contains(&(member.clone(), member_class)) {
                true
            } else if depth < self.max_depth {
                match self.lookup(member)? {
                    Some(member_auth) => {
                        let nested = match member_class {
                            AuthorityClass::Posting => &member_auth.posting,
                            _ => &member_auth.active,
                        };
                        let ok = self.check_authority(nested, member_class, depth + 1)?;
                        if ok {
                            self.approved.insert((member.clone(), member_class));
                        }
                        ok
                    }
                    None => false,
                }
            } else {
                false
            };
            if proven {
                total += *weight as u64;
                if total >= threshold {
                    return Ok(true);
                }
            }
        }
        Ok(total >= threshold)
    }

    /// Checks `account`'s authority of `class`, falling back to the
    /// stronger classes.
    fn check_account(&mut self, account: &AccountName, class: AuthorityClass) -> TxApplyResult<()> {
        let auths = self
            .lookup(account)?
            .ok_or_else(|| TxApplyError::MissingAuthority {
                account: account.clone(),
                class,
            })?;
        let candidates: Vec<(&Authority, AuthorityClass)> = match class {
            AuthorityClass::Owner => vec![(&auths.owner, AuthorityClass::Active)],
            AuthorityClass::Active => vec![
                (&auths.active, AuthorityClass::Active),
                (&auths.owner, AuthorityClass::Active),
            ],
            AuthorityClass::Posting => vec![
                (&auths.posting, AuthorityClass::Posting),
                (&auths.active, AuthorityClass::Active),
                (&auths.owner, AuthorityClass::Active),
            ],
        };
        for (auth, member_class) in candidates {
            if self.check_authority(auth, member_class, 0)? {
                return Ok(());
            }
        }
        Err(TxApplyError::MissingAuthority {
            account: account.clone(),
            class,
        })
    }

    /// True when some provided key was never needed.
    pub fn has_unused_keys(&self) -> bool {
        self.keys.iter().any(|k| !self.used.contains(k))
    }
}

/// Verifies that `keys` satisfy every authority in `required`.
pub fn verify_authority(
    state: &ChainState,
    required: &RequiredAuthorities,
    keys: &BTreeSet<PublicKey>,
) -> TxApplyResult<()> {
    if !required.posting.is_empty()
        && (!required.active.is_empty() || !required.owner.is_empty() || !required.other.is_empty())
    {
        return Err(TxApplyError::MixedPostingAuthority);
    }

    let mut sign_state = SignState::new(state, keys);

    for auth in &required.other {
        if !sign_state.check_authority(auth, AuthorityClass::Active, 0)? {
            return Err(TxApplyError::MissingOtherAuthority);
        }
    }
    for account in &required.posting {
        sign_state.check_account(account, AuthorityClass::Posting)?;
    }
    for account in &required.active {
        sign_state.check_account(account, AuthorityClass::Active)?;
    }
    for account in &required.owner {
        sign_state.check_account(account, AuthorityClass::Owner)?;
    }

    if sign_state.has_unused_keys() {
        debug!(keys = keys.len(), "transaction carries unused signatures");
        return Err(TxApplyError::IrrelevantSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TimePointSec;

    fn key(seed: u8) -> PublicKey {
        PublicKey([seed; 32])
    }

    fn keys(seeds: &[u8]) -> BTreeSet<PublicKey> {
        seeds.iter().map(|s| key(*s)).collect()
    }

    fn add(state: &mut ChainState, name: &str, owner: Authority, active: Authority, posting: Authority) {
        state
            .account_authorities
            .insert(AccountAuthority {
                account: AccountName::from(name),
                owner,
                active,
                posting,
                last_owner_update: TimePointSec::MINIMUM,
            })
            .unwrap();
    }

    fn simple_state() -> ChainState {
        let mut state = ChainState::new();
        add(
            &mut state,
            "alice",
            Authority::from_key(key(1)),
            Authority::from_key(key(2)),
            Authority::from_key(key(3)),
        );
        state
    }

    fn active(name: &str) -> RequiredAuthorities {
        let mut required = RequiredAuthorities::default();
        required.active.insert(AccountName::from(name));
        required
    }

    fn posting(name: &str) -> RequiredAuthorities {
        let mut required = RequiredAuthorities::default();
        required.posting.insert(AccountName::from(name));
        required
    }

    #[test]
    fn test_stronger_classes_satisfy_weaker() {
        let state = simple_state();
        verify_authority(&state, &active("alice"), &keys(&[2])).unwrap();
        verify_authority(&state, &active("alice"), &keys(&[1])).unwrap();
        verify_authority(&state, &posting("alice"), &keys(&[1])).unwrap();
        assert!(matches!(
            verify_authority(&state, &active("alice"), &keys(&[3])),
            Err(TxApplyError::MissingAuthority {
                class: AuthorityClass::Active,
                ..
            })
        ));
    }

    #[test]
    fn test_weighted_threshold() {
        let mut state = ChainState::new();
        let mut multi = Authority::new(3);
        multi.add_key(key(1), 1).add_key(key(2), 2).add_key(key(4), 1);
        add(&mut state, "corp", multi.clone(), multi.clone(), multi);
        assert!(verify_authority(&state, &active("corp"), &keys(&[1])).is_err());
        verify_authority(&state, &active("corp"), &keys(&[1, 2])).unwrap();
    }

    #[test]
    fn test_account_member_recursion_is_bounded() {
        let mut state = simple_state();
        let mut via_alice = Authority::new(1);
        via_alice.add_account(AccountName::from("alice"), 1);
        add(&mut state, "bob", via_alice.clone(), via_alice.clone(), via_alice);
        verify_authority(&state, &active("bob"), &keys(&[2])).unwrap();

        let mut via_bob = Authority::new(1);
        via_bob.add_account(AccountName::from("bob"), 1);
        add(&mut state, "carol", via_bob.clone(), via_bob.clone(), via_bob.clone());
        verify_authority(&state, &active("carol"), &keys(&[2])).unwrap();

        add(&mut state, "dave", via_bob.clone(), via_bob.clone(), via_bob);
        let mut via_carol = Authority::new(1);
        via_carol.add_account(AccountName::from("carol"), 1);
        add(&mut state, "erin", via_carol.clone(), via_carol.clone(), via_carol);
        // erin -> carol -> bob -> alice is one level too deep.
        assert!(verify_authority(&state, &active("erin"), &keys(&[2])).is_err());
    }

    #[test]
    fn test_unused_signature_rejected() {
        let state = simple_state();
        assert!(matches!(
            verify_authority(&state, &active("alice"), &keys(&[2, 7])),
            Err(TxApplyError::IrrelevantSignature)
        ));
    }

    #[test]
    fn test_posting_does_not_mix() {
        let state = simple_state();
        let mut required = posting("alice");
        required.active.insert(AccountName::from("alice"));
        assert!(matches!(
            verify_authority(&state, &required, &keys(&[2])),
            Err(TxApplyError::MixedPostingAuthority)
        ));
    }

    #[test]
    fn test_other_authority() {
        let state = simple_state();
        let mut required = RequiredAuthorities::default();
        required.other.push(Authority::from_key(key(8)));
        verify_authority(&state, &required, &keys(&[8])).unwrap();
        assert!(matches!(
            verify_authority(&state, &required, &keys(&[2])),
            Err(TxApplyError::MissingOtherAuthority)
        ));
    }
}
