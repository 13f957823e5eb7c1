//! The ledger: a reference substrate for custody records.
//!
//! One record slot and one event log per tracked package, keyed by package
//! id. Commits are serialized per record by the slot's write lock and made
//! durable by journaling the post-state before applying it in memory; on
//! open the journal is replayed to restore both records and event logs.

use crate::error::JournalError;
use crate::journal::{Journal, JournalEntry};
use crate::log::{EventCursor, EventLog};
use custody_core::{
    Commit, Committed, EngineError, PackageId, ShipmentRecord, Substrate, SubstrateError,
    TxContext,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Journal file name inside the data directory.
const JOURNAL_FILE: &str = "custody.log";

struct PackageSlot {
    record: RwLock<ShipmentRecord>,
    log: Arc<EventLog>,
}

impl PackageSlot {
    fn new(record: ShipmentRecord) -> Arc<Self> {
        Arc::new(Self {
            record: RwLock::new(record),
            log: EventLog::new(),
        })
    }
}

/// Durable, ordered storage for shipment records and their event logs.
pub struct Ledger {
    packages: DashMap<String, Arc<PackageSlot>>,
    journal: Option<Journal>,
}

impl Ledger {
    /// Creates a ledger with no durable journal, for tests and embedding.
    pub fn in_memory() -> Self {
        Self {
            packages: DashMap::new(),
            journal: None,
        }
    }

    /// Opens a durable ledger in `dir`, replaying the journal to restore
    /// committed records and event logs.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, JournalError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let (journal, entries) = Journal::open(dir.as_ref().join(JOURNAL_FILE))?;

        let ledger = Self {
            packages: DashMap::new(),
            journal: Some(journal),
        };

        let entry_count = entries.len();
        for (_, entry) in entries {
            ledger.replay_entry(entry);
        }

        if entry_count > 0 {
            tracing::info!(
                entries = entry_count,
                packages = ledger.packages.len(),
                "journal replay complete"
            );
        }

        Ok(ledger)
    }

    fn replay_entry(&self, entry: JournalEntry) {
        match entry {
            JournalEntry::Created { record } => {
                let key = record.package_id().to_string();
                if !self.packages.contains_key(&key) {
                    self.packages.insert(key, PackageSlot::new(record));
                }
            }
            JournalEntry::Transition { record, event } => {
                if let Some(slot) = self.packages.get(record.package_id().as_str()) {
                    *slot.record.write() = record;
                    slot.log.append(event);
                } else {
                    tracing::warn!(
                        package_id = %record.package_id(),
                        "transition for unknown package in journal, skipping"
                    );
                }
            }
        }
    }

    /// Returns true if a record exists for the package.
    pub fn contains(&self, package_id: &PackageId) -> bool {
        self.packages.contains_key(package_id.as_str())
    }

    /// Returns all tracked package ids.
    pub fn package_ids(&self) -> Vec<PackageId> {
        self.packages
            .iter()
            .map(|entry| PackageId::from(entry.key().clone()))
            .collect()
    }

    /// Returns the event log for a package.
    pub fn events(&self, package_id: &PackageId) -> Result<Arc<EventLog>, SubstrateError> {
        Ok(self.slot(package_id)?.log.clone())
    }

    /// Opens a cursor over a package's events, starting at `from`.
    ///
    /// The cursor is the restartable lazy sequence consumed by relays: it
    /// yields every committed event in order, from any committed position.
    pub fn subscribe(
        &self,
        package_id: &PackageId,
        from: u64,
    ) -> Result<EventCursor, SubstrateError> {
        let slot = self.slot(package_id)?;
        Ok(EventCursor::new(slot.log.clone(), from))
    }

    fn slot(&self, package_id: &PackageId) -> Result<Arc<PackageSlot>, SubstrateError> {
        self.packages
            .get(package_id.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SubstrateError::PackageNotFound {
                package_id: package_id.to_string(),
            })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl Substrate for Ledger {
    fn create(&self, record: ShipmentRecord) -> Result<(), SubstrateError> {
        let key = record.package_id().to_string();
        match self.packages.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SubstrateError::PackageExists { package_id: key })
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if let Some(journal) = &self.journal {
                    journal.append(&JournalEntry::Created {
                        record: record.clone(),
                    })?;
                }
                vacant.insert(PackageSlot::new(record));
                Ok(())
            }
        }
    }

    fn read(&self, package_id: &PackageId) -> Result<ShipmentRecord, SubstrateError> {
        Ok(self.slot(package_id)?.record.read().clone())
    }

    fn transact<F>(&self, package_id: &PackageId, tx: F) -> Result<Committed, EngineError>
    where
        F: FnOnce(&ShipmentRecord, &TxContext) -> Result<Commit, EngineError>,
    {
        let slot = self.slot(package_id)?;

        // The write lock is the per-record serialization point: it is held
        // across validate, journal, and apply, so the Nth transaction
        // observes exactly the post-state of the (N-1)th.
        let mut record = slot.record.write();

        let ctx = TxContext {
            timestamp: Self::now().max(record.last_update_time()),
            transaction_ref: Uuid::new_v4(),
        };

        let commit = tx(&record, &ctx)?;

        // Journal before applying: if the durable write fails, nothing has
        // changed in memory and the whole transaction reports failure.
        if let Some(journal) = &self.journal {
            journal
                .append(&JournalEntry::Transition {
                    record: commit.record.clone(),
                    event: commit.event.clone(),
                })
                .map_err(SubstrateError::from)?;
        }

        if commit.fee > 0 {
            tracing::debug!(package_id = %package_id, fee = commit.fee, "transaction fee consumed");
        }

        *record = commit.record;
        let sequence = slot.log.append(commit.event.clone());

        Ok(Committed {
            event: commit.event,
            sequence,
        })
    }
}
