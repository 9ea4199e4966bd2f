//! Shared helpers for chain-level integration tests.
//!
//! Every test chain starts from the same genesis: all initial witnesses sign
//! with `init_key()`, and initminer holds the whole supply.

#![allow(dead_code)]

use anyhow::Result;
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use lib_blockchain::protocol::constants::INIT_MINER_NAME;
use lib_blockchain::protocol::operations::TransferOperation;
use lib_blockchain::{
    AccountName, Asset, Chain, ChainConfig, GenesisConfig, Operation, PublicKey, SignedBlock, SignedTransaction,
    SkipFlags, Transaction,
};

pub const INITIAL_SUPPLY: i64 = 10_000_000_000;

/// Installs a test subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn init_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

pub fn genesis() -> GenesisConfig {
    GenesisConfig::default()
        .with_init_witness_key(PublicKey::from_signing_key(&init_key()))
        .with_initial_supply(INITIAL_SUPPLY)
}

pub fn config_in(dir: &TempDir) -> ChainConfig {
    ChainConfig::default()
        .with_data_dir(dir.path())
        .with_flush_interval(0)
        .with_genesis(genesis())
}

/// A chain in its own temporary directory.
pub struct TestChain {
    pub dir: TempDir,
    pub config: ChainConfig,
    pub chain: Chain,
    memo_seq: u64,
}

impl TestChain {
    pub fn new() -> Result<Self> {
        Self::with_config(|c| c)
    }

    pub fn with_config(adjust: impl FnOnce(ChainConfig) -> ChainConfig) -> Result<Self> {
        init_tracing();
        let dir = TempDir::new()?;
        let config = adjust(config_in(&dir));
        let chain = Chain::open(config.clone())?;
        Ok(Self {
            dir,
            config,
            chain,
            memo_seq: 0,
        })
    }

    /// Closes and reopens the chain on the same directory.
    pub fn reopen(self) -> Result<Self> {
        let Self {
            dir,
            config,
            chain,
            memo_seq,
        } = self;
        chain.close()?;
        let chain = Chain::open(config.clone())?;
        Ok(Self {
            dir,
            config,
            chain,
            memo_seq,
        })
    }

    /// Closes the chain and rebuilds its ledger from the block log.
    pub fn reindex(self) -> Result<Self> {
        let Self {
            dir,
            config,
            chain,
            memo_seq,
        } = self;
        chain.close()?;
        let chain = Chain::reindex(config.clone())?;
        Ok(Self {
            dir,
            config,
            chain,
            memo_seq,
        })
    }

    /// Produces a block in the next slot with the pending transactions.
    pub fn produce_block(&mut self) -> Result<SignedBlock> {
        self.produce_block_at_slot(1)
    }

    pub fn produce_block_at_slot(&mut self, slot: u32) -> Result<SignedBlock> {
        let when = self.chain.get_slot_time(slot);
        let witness = self.chain.get_scheduled_witness(slot);
        Ok(self
            .chain
            .generate_block(when, &witness, &init_key(), SkipFlags::NOTHING)?)
    }

    pub fn produce_blocks(&mut self, count: u32) -> Result<Vec<SignedBlock>> {
        (0..count).map(|_| self.produce_block()).collect()
    }

    /// A transaction on the current head signed with the init key.
    pub fn sign(&mut self, operations: Vec<Operation>) -> SignedTransaction {
        let mut trx = Transaction {
            expiration: self.chain.head_block_time() + 120,
            operations,
            ..Default::default()
        };
        trx.set_reference_block(&self.chain.head_block_id());
        let mut signed = SignedTransaction::new(trx);
        signed.sign(&init_key(), &self.chain.chain_id());
        signed
    }

    /// A transfer whose memo makes it unique.
    pub fn transfer(&mut self, from: &str, to: &str, amount: i64) -> SignedTransaction {
        self.memo_seq += 1;
        let op = TransferOperation {
            from: from.into(),
            to: to.into(),
            amount: Asset::liquid(amount),
            memo: format!("test-{}", self.memo_seq),
        };
        self.sign(vec![op.into()])
    }

    pub fn push(&mut self, trx: SignedTransaction) -> Result<()> {
        Ok(self.chain.push_transaction(trx, SkipFlags::NOTHING)?)
    }

    pub fn balance(&self, name: &str) -> i64 {
        self.chain.account(name).map(|a| a.balance.amount).unwrap_or(0)
    }
}

pub fn initminer() -> AccountName {
    AccountName::from(INIT_MINER_NAME)
}

pub fn init_miner(i: usize) -> AccountName {
    lib_blockchain::execution::genesis::init_miner_name(i)
}
