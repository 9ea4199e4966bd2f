//! Execution Errors
//!
//! Error types for operation, transaction and block application. These are
//! distinct from storage errors: execution errors are semantic failures
//! (missing authority, insufficient balance, wrong witness).
//!
//! # Layers
//!
//! ```text
//! EvalError          one operation's stateful preconditions
//!   -> TxApplyError  a transaction, carrying the failing op index
//!     -> BlockApplyError  a block, carrying the failing tx index
//!       -> ChainError     the engine surface (fork db, block log, config)
//! ```

use thiserror::Error;

use crate::block_log::BlockLogError;
use crate::config::ConfigError;
use crate::fork_db::ForkDbError;
use crate::protocol::{
    AccountName, Asset, AssetError, AuthorityClass, BlockId, Checksum, SignatureError,
    TimePointSec, TransactionId, ValidationError,
};
use crate::storage::StorageError;

/// Error while evaluating one operation or running one end-of-block step.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Account {account} has insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        account: AccountName,
        balance: Asset,
        required: Asset,
    },

    #[error("{op}: {reason}")]
    Precondition { op: &'static str, reason: String },

    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn precondition(op: &'static str, reason: impl Into<String>) -> Self {
        EvalError::Precondition {
            op,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for EvalError {
    fn from(e: anyhow::Error) -> Self {
        EvalError::Listener(format!("{e:#}"))
    }
}

/// Returns `EvalError::Precondition` from the enclosing function unless
/// `cond` holds.
#[macro_export]
macro_rules! ensure_eval {
    ($cond:expr, $op:expr, $($fmt:tt)+) => {
        if !$cond {
            return Err($crate::execution::errors::EvalError::Precondition {
                op: $op,
                reason: format!($($fmt)+),
            });
        }
    };
}

/// Error during transaction application
#[derive(Error, Debug, Clone)]
pub enum TxApplyError {
    // =========================================================================
    // Stateless
    // =========================================================================
    #[error("Transaction validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Transaction is {size} bytes, max {max}")]
    TooLarge { size: usize, max: usize },

    // =========================================================================
    // Replay protection
    // =========================================================================
    #[error("Duplicate transaction: {0}")]
    Duplicate(TransactionId),

    #[error("Transaction expired at {expiration}, now {now}")]
    Expired {
        expiration: TimePointSec,
        now: TimePointSec,
    },

    #[error("Transaction expiration {expiration} is beyond {max}")]
    ExpirationTooFar {
        expiration: TimePointSec,
        max: TimePointSec,
    },

    #[error("TaPoS mismatch: ref_block_num {ref_block_num}, ref_block_prefix {ref_block_prefix}")]
    TaposMismatch {
        ref_block_num: u16,
        ref_block_prefix: u32,
    },

    // =========================================================================
    // Authority
    // =========================================================================
    #[error("Missing {class} authority of {account}")]
    MissingAuthority {
        account: AccountName,
        class: AuthorityClass,
    },

    #[error("Missing a required non-account authority")]
    MissingOtherAuthority,

    #[error("Posting authority cannot be combined with active or owner authority")]
    MixedPostingAuthority,

    #[error("Transaction carries signatures that are not needed")]
    IrrelevantSignature,

    #[error("Authority check visited more than {max} accounts")]
    TooManySignatureChecks { max: u32 },

    // =========================================================================
    // Fees and evaluation
    // =========================================================================
    #[error("Account {account} cannot pay fee {fee}: balance {balance}")]
    InsufficientFee {
        account: AccountName,
        fee: Asset,
        balance: Asset,
    },

    #[error("Fee transfer failed: {0}")]
    FeeTransfer(#[source] EvalError),

    #[error("Operation {index} ({op}) failed: {source}")]
    Operation {
        index: usize,
        op: &'static str,
        #[source]
        source: EvalError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Listener error: {0}")]
    Listener(String),
}

impl From<anyhow::Error> for TxApplyError {
    fn from(e: anyhow::Error) -> Self {
        TxApplyError::Listener(format!("{e:#}"))
    }
}

/// Error during block application
#[derive(Error, Debug, Clone)]
pub enum BlockApplyError {
    #[error("Block {block_num} merkle root mismatch: header {expected}, computed {actual}")]
    MerkleMismatch {
        block_num: u32,
        expected: Checksum,
        actual: Checksum,
    },

    #[error("Block {block_num} previous {actual} does not match head {expected}")]
    WrongPrevious {
        block_num: u32,
        expected: BlockId,
        actual: BlockId,
    },

    #[error("Block {block_num} timestamp {timestamp} is not after head time {head_time}")]
    TimestampNotIncreasing {
        block_num: u32,
        timestamp: TimePointSec,
        head_time: TimePointSec,
    },

    #[error("Block {block_num} is not signed by the signing key of {witness}")]
    BadWitnessSignature { block_num: u32, witness: AccountName },

    #[error("Block {block_num} produced by {actual}, scheduled witness is {expected}")]
    WrongScheduledWitness {
        block_num: u32,
        expected: AccountName,
        actual: AccountName,
    },

    #[error("Block {block_num} names unknown witness {witness}")]
    UnknownWitness { block_num: u32, witness: AccountName },

    #[error("Block too large: {size} bytes, max {max}")]
    BlockTooLarge { size: usize, max: usize },

    #[error("Undo history exhausted: head {head}, last irreversible {last_irreversible}")]
    UndoHistoryExhausted { head: u32, last_irreversible: u32 },

    #[error("Transaction {index} ({trx_id}) failed: {source}")]
    Transaction {
        index: usize,
        trx_id: TransactionId,
        #[source]
        source: TxApplyError,
    },

    #[error("Block {block_num} does not match checkpoint: expected {expected}, got {actual}")]
    CheckpointMismatch {
        block_num: u32,
        expected: BlockId,
        actual: BlockId,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("End-of-block step {step} failed: {source}")]
    Processing {
        step: &'static str,
        #[source]
        source: EvalError,
    },

    #[error("Hardfork applied out of order: expected {expected}, got {actual}")]
    HardforkOutOfOrder { expected: u32, actual: u32 },

    #[error("Witness {witness} runs version {running}, below the applied hardfork {required}")]
    StaleRunningVersion {
        witness: AccountName,
        running: String,
        required: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Listener error: {0}")]
    Listener(String),
}

impl From<anyhow::Error> for BlockApplyError {
    fn from(e: anyhow::Error) -> Self {
        BlockApplyError::Listener(format!("{e:#}"))
    }
}

/// Error at the engine surface.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)]
    Block(#[from] BlockApplyError),

    #[error(transparent)]
    Transaction(#[from] TxApplyError),

    #[error("Fork database error: {0}")]
    ForkDb(#[from] ForkDbError),

    #[error("Block log error: {0}")]
    BlockLog(#[from] BlockLogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Block production failed: {0}")]
    BlockProduction(String),

    #[error("Chain is not open")]
    NotOpen,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Result type for transaction application
pub type TxApplyResult<T> = Result<T, TxApplyError>;

/// Result type for block application
pub type BlockApplyResult<T> = Result<T, BlockApplyError>;

pub type ChainResult<T> = Result<T, ChainError>;
