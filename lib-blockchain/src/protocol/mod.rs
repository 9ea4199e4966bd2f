//! Protocol Module
//!
//! Wire-level types shared by every layer of the engine: names, ids, keys,
//! assets, authorities, operations, transactions and blocks, plus the
//! consensus constants and hardfork versions.
//!
//! # Codec
//!
//! Every type here derives `serde`. The canonical encoding is `bincode`;
//! digests, ids and "byte size" limits are all computed over it.
//!
//! # Design Principles
//!
//! 1. **Stateless validation lives here**: `validate()` on an operation or
//!    transaction never touches ledger state.
//! 2. **Closed operation set**: `Operation` is an enum, and every consumer
//!    matches it exhaustively.
//! 3. **Virtual operations are separate**: they are produced by the engine
//!    and cannot appear in a transaction.

pub mod asset;
pub mod authority;
pub mod block;
pub mod constants;
pub mod hardfork;
pub mod operations;
pub mod transaction;
pub mod types;
pub mod validation;
pub mod virtual_operations;

pub use asset::{Asset, AssetError, Price, Symbol};
pub use authority::{Authority, AuthorityClass, Weight};
pub use block::{merkle_root, BlockHeader, BlockHeaderExtension, SignedBlock, SignedBlockHeader};
pub use hardfork::{HardforkSchedule, HardforkVersion, Version};
pub use operations::{ChainProperties, Operation, OperationKind, RequiredAuthorities};
pub use transaction::{SignatureError, SignedTransaction, Transaction};
pub use types::{
    AccountName, BlockId, ChainId, Checksum, Digest, PublicKey, Signature, TimePointSec,
    TransactionId,
};
pub use validation::{ValidationError, ValidationResult};
pub use virtual_operations::{AppliedOperation, VirtualOperation};
