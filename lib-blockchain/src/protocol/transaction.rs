//! Transactions
//!
//! A transaction is an ordered list of operations bound to a recent block
//! (TaPoS) and an expiration time. Signatures cover
//! `chain_id || bincode(transaction)`, so a signed transaction cannot be
//! replayed on another chain.
//!
//! ed25519 public keys cannot be recovered from a signature, so each
//! signature travels with the key that produced it. Verification checks every
//! pair and returns the key set; authority checks then run against that set.

use std::collections::BTreeSet;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use super::constants::MAX_TRANSACTION_SIZE;
use super::operations::{Operation, RequiredAuthorities};
use super::types::{hash_bytes, BlockId, ChainId, Digest, PublicKey, Signature, TimePointSec, TransactionId};
use super::validation::{ValidationError, ValidationResult};

/// Unsigned transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Low 16 bits of the referenced block number.
    pub ref_block_num: u16,
    /// TaPoS prefix of the referenced block id.
    pub ref_block_prefix: u32,
    pub expiration: TimePointSec,
    pub operations: Vec<Operation>,
    pub extensions: Vec<Vec<u8>>,
}

impl Transaction {
    /// Canonical encoding. Infallible for these types; an encoding failure
    /// yields an empty buffer, which never matches a real digest.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn digest(&self) -> Digest {
        Digest::of(&self.to_bytes())
    }

    /// First 20 bytes of the unsigned digest.
    pub fn id(&self) -> TransactionId {
        let digest = hash_bytes(&self.to_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        TransactionId(out)
    }

    /// Digest that signatures commit to.
    pub fn sig_digest(&self, chain_id: &ChainId) -> Digest {
        let mut buf = chain_id.as_bytes().to_vec();
        buf.extend_from_slice(&self.to_bytes());
        Digest::of(&buf)
    }

    /// Points the transaction at `reference` for TaPoS.
    pub fn set_reference_block(&mut self, reference: &BlockId) {
        self.ref_block_num = (reference.block_num() & 0xffff) as u16;
        self.ref_block_prefix = reference.tapos_prefix();
    }

    pub fn set_expiration(&mut self, expiration: TimePointSec) {
        self.expiration = expiration;
    }

    /// Stateless checks of the transaction and every operation it holds.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.operations.is_empty() {
            return Err(ValidationError::EmptyTransaction);
        }
        for op in &self.operations {
            op.validate()?;
        }
        Ok(())
    }

    /// Union of the authorities every operation requires.
    pub fn required_authorities(&self) -> RequiredAuthorities {
        let mut auths = RequiredAuthorities::default();
        for op in &self.operations {
            op.required_authorities(&mut auths);
        }
        auths
    }
}

/// A transaction with `(key, signature)` pairs attached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub trx: Transaction,
    pub signatures: Vec<(PublicKey, Signature)>,
}

impl SignedTransaction {
    pub fn new(trx: Transaction) -> Self {
        Self {
            trx,
            signatures: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.trx.id()
    }

    /// Adds a signature by `key` over the chain-bound digest.
    pub fn sign(&mut self, key: &SigningKey, chain_id: &ChainId) -> &mut Self {
        let digest = self.trx.sig_digest(chain_id);
        self.signatures
            .push((PublicKey::from_signing_key(key), Signature::sign(key, &digest.0)));
        self
    }

    /// Verifies every pair and returns the signing keys.
    ///
    /// A pair that fails verification returns that pair's key as the error.
    /// The same key signing twice is reported as a duplicate.
    pub fn signature_keys(&self, chain_id: &ChainId) -> Result<BTreeSet<PublicKey>, SignatureError> {
        let digest = self.trx.sig_digest(chain_id);
        let mut keys = BTreeSet::new();
        for (key, sig) in &self.signatures {
            if !key.verify(&digest.0, sig) {
                return Err(SignatureError::Invalid(*key));
            }
            if !keys.insert(*key) {
                return Err(SignatureError::Duplicate(*key));
            }
        }
        Ok(keys)
    }

    /// Hash of the signed transaction, used as the merkle leaf.
    pub fn merkle_digest(&self) -> Digest {
        Digest::of(&self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    /// Wire size in bytes.
    pub fn packed_size(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        let size = self.packed_size();
        if size > MAX_TRANSACTION_SIZE as usize {
            return Err(ValidationError::TooLong {
                field: "transaction",
                len: size,
                max: MAX_TRANSACTION_SIZE as usize,
            });
        }
        self.trx.validate()
    }
}

impl From<Transaction> for SignedTransaction {
    fn from(trx: Transaction) -> Self {
        Self::new(trx)
    }
}

impl std::ops::Deref for SignedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        &self.trx
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature by {0} does not verify")]
    Invalid(PublicKey),

    #[error("Duplicate signature by {0}")]
    Duplicate(PublicKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::asset::Asset;
    use crate::protocol::operations::TransferOperation;
    use crate::protocol::types::AccountName;

    fn transfer_tx() -> Transaction {
        Transaction {
            expiration: TimePointSec(100),
            operations: vec![TransferOperation {
                from: AccountName::from("alice"),
                to: AccountName::from("bob"),
                amount: Asset::liquid(5),
                memo: String::new(),
            }
            .into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_signature_is_bound_to_chain_id() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let chain_a = ChainId::from_seed("a");
        let chain_b = ChainId::from_seed("b");
        let mut stx = SignedTransaction::new(transfer_tx());
        stx.sign(&key, &chain_a);

        let keys = stx.signature_keys(&chain_a).unwrap();
        assert!(keys.contains(&PublicKey::from_signing_key(&key)));
        assert!(matches!(stx.signature_keys(&chain_b), Err(SignatureError::Invalid(_))));
    }

    #[test]
    fn test_id_ignores_signatures() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let mut stx = SignedTransaction::new(transfer_tx());
        let before = stx.id();
        stx.sign(&key, &ChainId::from_seed("a"));
        assert_eq!(stx.id(), before);
        assert_ne!(stx.merkle_digest(), SignedTransaction::new(transfer_tx()).merkle_digest());
    }

    #[test]
    fn test_reference_block_uses_low_bits_and_prefix() {
        let id = BlockId::from_digest(&[9u8; 32], 0x0001_0005);
        let mut tx = transfer_tx();
        tx.set_reference_block(&id);
        assert_eq!(tx.ref_block_num, 5);
        assert_eq!(tx.ref_block_prefix, id.tapos_prefix());
    }

    #[test]
    fn test_empty_transaction_is_invalid() {
        let tx = Transaction::default();
        assert_eq!(tx.validate(), Err(ValidationError::EmptyTransaction));
    }
}
