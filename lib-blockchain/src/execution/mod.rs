//! Block Execution Module
//!
//! Everything that moves the ledger forward or back: the `Chain` driver,
//! block and transaction application, genesis and the ledger audit.
//!
//! # Architecture
//!
//! ```text
//! Chain::push_block(block)
//!     │
//!     ├── fork database: link, pick the longest branch, switch if needed
//!     │
//!     ├── undo session
//!     │       ├── apply_block
//!     │       │       ├── header checks
//!     │       │       ├── apply_transaction (per transaction)
//!     │       │       ├── globals, witness participation, irreversibility
//!     │       │       └── per-block steps and hardforks
//!     │       └── validate_invariants (optional)
//!     │
//!     └── irreversible blocks → block log, undo history committed
//!
//!     On error: the session is undone and the block is dropped
//! ```
//!
//! # Invariants
//!
//! - Applying the same block to the same ledger yields the same ledger
//! - A failed block or transaction leaves no trace in the ledger
//! - The ledger revision equals the head block number between blocks

pub mod authority;
pub mod block_apply;
pub mod chain;
pub mod context;
pub mod errors;
pub mod genesis;
pub mod invariants;
pub mod skip_flags;
pub mod tx_apply;

pub use block_apply::apply_block;
pub use chain::Chain;
pub use context::ApplyContext;
pub use errors::{
    BlockApplyError, BlockApplyResult, ChainError, ChainResult, EvalError, EvalResult, TxApplyError, TxApplyResult,
};
pub use genesis::init_genesis;
pub use invariants::validate_invariants;
pub use skip_flags::SkipFlags;
pub use tx_apply::{apply_transaction, transaction_fee};
