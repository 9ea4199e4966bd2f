//! Blocks
//!
//! # Identity
//!
//! The block id is the digest of the signed header (header plus witness
//! signature), truncated to 20 bytes, with the block number written
//! big-endian over the first four bytes. A block's number is therefore
//! recoverable from its id, and `previous.block_num() + 1` is the number of
//! the block that names it.
//!
//! The witness signs the digest of the unsigned header only.
//!
//! # Merkle root
//!
//! Leaves are the digests of the signed transactions. Each level hashes
//! adjacent pairs; an odd node is carried up unchanged. The root is the
//! 20-byte checksum of the last remaining node, or zero for an empty block.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use super::hardfork::{HardforkVersion, Version};
use super::transaction::SignedTransaction;
use super::types::{AccountName, BlockId, Checksum, Digest, PublicKey, Signature, TimePointSec};

/// Header extensions signalled by the producing witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockHeaderExtension {
    /// Software version the witness is running.
    Version(Version),
    /// Hardfork the witness votes to activate, and when.
    HardforkVersionVote {
        hf_version: HardforkVersion,
        hf_time: TimePointSec,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: TimePointSec,
    pub witness: AccountName,
    pub transaction_merkle_root: Checksum,
    pub extensions: Vec<BlockHeaderExtension>,
}

impl BlockHeader {
    pub fn block_num(&self) -> u32 {
        self.previous.block_num() + 1
    }

    /// Digest the witness signs.
    pub fn digest(&self) -> Digest {
        Digest::of(&bincode::serialize(self).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub header: BlockHeader,
    pub witness_signature: Signature,
}

impl SignedBlockHeader {
    pub fn id(&self) -> BlockId {
        let digest = Digest::of(&bincode::serialize(self).unwrap_or_default());
        BlockId::from_digest(&digest.0, self.header.block_num())
    }

    pub fn sign(&mut self, key: &SigningKey) {
        self.witness_signature = Signature::sign(key, &self.header.digest().0);
    }

    pub fn validate_signee(&self, expected: &PublicKey) -> bool {
        expected.verify(&self.header.digest().0, &self.witness_signature)
    }
}

impl std::ops::Deref for SignedBlockHeader {
    type Target = BlockHeader;

    fn deref(&self) -> &BlockHeader {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedBlock {
    pub signed_header: SignedBlockHeader,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn id(&self) -> BlockId {
        self.signed_header.id()
    }

    pub fn block_num(&self) -> u32 {
        self.signed_header.header.block_num()
    }

    pub fn previous(&self) -> BlockId {
        self.signed_header.header.previous
    }

    pub fn timestamp(&self) -> TimePointSec {
        self.signed_header.header.timestamp
    }

    pub fn witness(&self) -> &AccountName {
        &self.signed_header.header.witness
    }

    pub fn header(&self) -> &BlockHeader {
        &self.signed_header.header
    }

    pub fn sign(&mut self, key: &SigningKey) {
        self.signed_header.sign(key);
    }

    /// Merkle root over the signed transactions.
    pub fn calculate_merkle_root(&self) -> Checksum {
        merkle_root(self.transactions.iter().map(|t| t.merkle_digest()).collect())
    }

    /// Wire size in bytes.
    pub fn packed_size(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(usize::MAX)
    }
}

/// Pairwise merkle reduction over `leaves`.
pub fn merkle_root(mut leaves: Vec<Digest>) -> Checksum {
    if leaves.is_empty() {
        return Checksum::ZERO;
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for pair in leaves.chunks(2) {
            match pair {
                [a, b] => {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(&a.0);
                    buf[32..].copy_from_slice(&b.0);
                    next.push(Digest::of(&buf));
                }
                [a] => next.push(*a),
                _ => unreachable!("chunks(2) yields one or two items"),
            }
        }
        leaves = next;
    }
    Checksum::of(&leaves[0].0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_carries_number() {
        let mut prev = SignedBlock::default();
        prev.signed_header.header.timestamp = TimePointSec(3);
        let mut next = SignedBlock::default();
        next.signed_header.header.previous = prev.id();
        assert_eq!(prev.block_num(), 1);
        assert_eq!(next.block_num(), 2);
        assert_eq!(next.id().block_num(), 2);
    }

    #[test]
    fn test_signature_covers_header_not_transactions() {
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let mut block = SignedBlock::default();
        block.signed_header.header.witness = AccountName::from("initminer");
        block.sign(&key);
        let signer = PublicKey::from_signing_key(&key);
        assert!(block.signed_header.validate_signee(&signer));

        block.signed_header.header.timestamp = TimePointSec(9);
        assert!(!block.signed_header.validate_signee(&signer));
    }

    #[test]
    fn test_merkle_root_carries_odd_leaf() {
        let a = Digest::of(b"a");
        let b = Digest::of(b"b");
        let c = Digest::of(b"c");
        assert_eq!(merkle_root(vec![]), Checksum::ZERO);
        assert_eq!(merkle_root(vec![a]), Checksum::of(&a.0));

        let mut ab = [0u8; 64];
        ab[..32].copy_from_slice(&a.0);
        ab[32..].copy_from_slice(&b.0);
        let ab = Digest::of(&ab);
        let mut abc = [0u8; 64];
        abc[..32].copy_from_slice(&ab.0);
        abc[32..].copy_from_slice(&c.0);
        assert_eq!(merkle_root(vec![a, b, c]), Checksum::of(&Digest::of(&abc).0));
    }
}
