//! Execution substrate boundary.
//!
//! The substrate is the external layer that gives transitions atomicity,
//! per-record ordering, commit timestamps, and durable storage. The engine
//! never talks to storage directly: it hands the substrate one closure that
//! validates against the current record and yields the post-state record
//! paired with exactly one event. The substrate applies both or neither.

use crate::error::{EngineError, SubstrateError};
use crate::event::{PackageId, TransitionEvent};
use crate::record::ShipmentRecord;
use uuid::Uuid;

/// Per-transaction context assigned by the substrate at commit time.
#[derive(Debug, Clone)]
pub struct TxContext {
    /// Commit timestamp (unix seconds), non-decreasing per record.
    pub timestamp: i64,
    /// Identity of the transaction producing this commit.
    pub transaction_ref: Uuid,
}

/// The atomic unit a transition hands to the substrate.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Post-state of the record.
    pub record: ShipmentRecord,
    /// The one event paired with this mutation.
    pub event: TransitionEvent,
    /// Fee/value attached to the operation, consumed by the substrate.
    pub fee: u64,
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone)]
pub struct Committed {
    /// The appended event.
    pub event: TransitionEvent,
    /// Position of the event in the package's log.
    pub sequence: u64,
}

/// Ordered, atomic execution and durable storage for shipment records.
///
/// Implementations must serialize transactions per record: the closure passed
/// to [`Substrate::transact`] observes exactly the post-state of the previous
/// committed transaction, and a closure error aborts with nothing applied.
pub trait Substrate {
    /// Stores a newly created record. Fails if the package already exists.
    fn create(&self, record: ShipmentRecord) -> Result<(), SubstrateError>;

    /// Reads the current committed state of a record.
    fn read(&self, package_id: &PackageId) -> Result<ShipmentRecord, SubstrateError>;

    /// Runs one transition transaction against a record.
    fn transact<F>(&self, package_id: &PackageId, tx: F) -> Result<Committed, EngineError>
    where
        F: FnOnce(&ShipmentRecord, &TxContext) -> Result<Commit, EngineError>;
}
