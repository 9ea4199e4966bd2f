//! Chain Event Notification
//!
//! Listeners observe block, transaction and operation application. Events
//! are delivered synchronously, in registration order, on the thread that
//! applies the block.
//!
//! # Contract
//!
//! - Every applied block produces `PreApplyBlock` then `PostApplyBlock`, with
//!   the transaction and operation events of that block in between
//! - Virtual operations are delivered as operation events with
//!   `AppliedOperation::Virtual`
//! - `IrreversibleBlock` fires once per block number as the irreversible
//!   point advances
//! - A listener error propagates and aborts whatever is being applied
//! - Listeners must not touch the ledger

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::trace;

use crate::protocol::{AppliedOperation, BlockId, SignedBlock, SignedTransaction, TransactionId};

// ============================================================================
// EVENT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNotification {
    pub block_id: BlockId,
    pub block_num: u32,
    pub block: Arc<SignedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionNotification {
    pub trx_id: TransactionId,
    pub block_num: u32,
    pub transaction: Arc<SignedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationNotification {
    /// Zero for virtual operations produced outside a transaction.
    pub trx_id: TransactionId,
    pub block_num: u32,
    /// `None` outside a transaction.
    pub trx_in_block: Option<u32>,
    pub op_in_trx: u32,
    /// Sequence number of this virtual operation within the block.
    pub virtual_op: u32,
    pub op: AppliedOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    PreApplyBlock(BlockNotification),
    PostApplyBlock(BlockNotification),
    PreApplyTransaction(TransactionNotification),
    PostApplyTransaction(TransactionNotification),
    PreApplyOperation(OperationNotification),
    PostApplyOperation(OperationNotification),
    IrreversibleBlock(u32),
}

impl ChainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::PreApplyBlock(_) => "pre_apply_block",
            ChainEvent::PostApplyBlock(_) => "post_apply_block",
            ChainEvent::PreApplyTransaction(_) => "pre_apply_transaction",
            ChainEvent::PostApplyTransaction(_) => "post_apply_transaction",
            ChainEvent::PreApplyOperation(_) => "pre_apply_operation",
            ChainEvent::PostApplyOperation(_) => "post_apply_operation",
            ChainEvent::IrreversibleBlock(_) => "irreversible_block",
        }
    }
}

impl fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEvent::PreApplyBlock(n) | ChainEvent::PostApplyBlock(n) => {
                write!(f, "{}(block={})", self.name(), n.block_num)
            }
            ChainEvent::PreApplyTransaction(n) | ChainEvent::PostApplyTransaction(n) => {
                write!(f, "{}(trx={})", self.name(), n.trx_id)
            }
            ChainEvent::PreApplyOperation(n) | ChainEvent::PostApplyOperation(n) => {
                write!(f, "{}(op={})", self.name(), n.op.name())
            }
            ChainEvent::IrreversibleBlock(num) => write!(f, "{}(block={})", self.name(), num),
        }
    }
}

// ============================================================================
// LISTENER TRAIT
// ============================================================================

pub trait ChainEventListener: Send {
    fn name(&self) -> &str {
        "listener"
    }

    fn on_event(&mut self, event: &ChainEvent) -> Result<()>;
}

/// Logs how long the wrapped listener takes for each event.
pub struct TimedListener<L> {
    inner: L,
}

impl<L: ChainEventListener> TimedListener<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: ChainEventListener> ChainEventListener for TimedListener<L> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn on_event(&mut self, event: &ChainEvent) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.on_event(event);
        trace!(
            listener = self.inner.name(),
            event = event.name(),
            micros = start.elapsed().as_micros() as u64,
            "listener timing"
        );
        result
    }
}

// ============================================================================
// NOTIFIER
// ============================================================================

#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Box<dyn ChainEventListener>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn ChainEventListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to each listener in turn. Stops at the first error.
    pub fn emit(&mut self, event: &ChainEvent) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.on_event(event).map_err(|e| {
                e.context(format!("listener '{}' failed on {}", listener.name(), event))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// RECORDING LISTENER
// ============================================================================

/// Captures every event it sees. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    pub events: Arc<Mutex<Vec<ChainEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Names of the operations seen in post-apply events, in order.
    pub fn applied_operation_names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChainEvent::PostApplyOperation(n) => Some(n.op.name()),
                _ => None,
            })
            .collect()
    }
}

impl ChainEventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&mut self, event: &ChainEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingListener;

    impl ChainEventListener for FailingListener {
        fn on_event(&mut self, _event: &ChainEvent) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[test]
    fn test_listeners_receive_events_in_order() {
        let mut notifier = Notifier::new();
        let first = RecordingListener::new();
        let second = RecordingListener::new();
        notifier.subscribe(Box::new(first.clone()));
        notifier.subscribe(Box::new(TimedListener::new(second.clone())));

        notifier.emit(&ChainEvent::IrreversibleBlock(3)).unwrap();
        notifier.emit(&ChainEvent::IrreversibleBlock(4)).unwrap();

        assert_eq!(first.events(), second.events());
        assert_eq!(first.events()[1], ChainEvent::IrreversibleBlock(4));
    }

    #[test]
    fn test_listener_error_stops_delivery() {
        let mut notifier = Notifier::new();
        let after = RecordingListener::new();
        notifier.subscribe(Box::new(FailingListener));
        notifier.subscribe(Box::new(after.clone()));

        let err = notifier.emit(&ChainEvent::IrreversibleBlock(1)).unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
        assert!(after.events().is_empty());
    }
}
