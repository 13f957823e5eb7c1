//! In-process event log and restartable cursors.
//!
//! One `EventLog` per tracked package: an append-only, ordered sequence of
//! committed transition events. Readers pull through an [`EventCursor`],
//! which can be (re)started from any committed position. This is the
//! subscription surface the external relay consumes.

use custody_core::TransitionEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

/// Append-only ordered sequence of committed transition events.
pub struct EventLog {
    events: RwLock<Vec<Arc<TransitionEvent>>>,
    notify: Notify,
}

impl EventLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: RwLock::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// Appends a committed event. Called only from the ledger commit path.
    pub(crate) fn append(&self, event: TransitionEvent) -> u64 {
        let mut events = self.events.write();
        let sequence = events.len() as u64;
        events.push(Arc::new(event));
        drop(events);
        self.notify.notify_waiters();
        sequence
    }

    /// Number of committed events.
    pub fn len(&self) -> u64 {
        self.events.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the event at `sequence`, if committed.
    pub fn get(&self, sequence: u64) -> Option<Arc<TransitionEvent>> {
        self.events.read().get(sequence as usize).cloned()
    }

    /// Returns all committed events from `sequence` onwards.
    pub fn events_from(&self, sequence: u64) -> Vec<Arc<TransitionEvent>> {
        let events = self.events.read();
        events
            .get(sequence as usize..)
            .map(|tail| tail.to_vec())
            .unwrap_or_default()
    }
}

/// A pull-based reader over one package's event log.
///
/// `next()` yields every committed event in order and waits for the next
/// commit once it catches up; the sequence never terminates. Dropping the
/// cursor and re-creating it from the last seen position resumes exactly
/// where it left off.
pub struct EventCursor {
    log: Arc<EventLog>,
    next: u64,
}

impl std::fmt::Debug for EventCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCursor")
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl EventCursor {
    pub(crate) fn new(log: Arc<EventLog>, from: u64) -> Self {
        Self { log, next: from }
    }

    /// The sequence number the next yielded event will have.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Yields the next committed event, waiting if none is available yet.
    pub async fn next(&mut self) -> Arc<TransitionEvent> {
        loop {
            // Register for notification before checking, so an append
            // between the check and the await cannot be missed.
            let notified = self.log.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.log.get(self.next) {
                self.next += 1;
                return event;
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{EventKind, PackageId, ShipmentStatus};
    use uuid::Uuid;

    fn sample_event(timestamp: i64) -> TransitionEvent {
        TransitionEvent {
            kind: EventKind::Departed,
            package_id: PackageId::from("1"),
            previous_status: ShipmentStatus::Created,
            new_status: ShipmentStatus::Departed,
            location: "San Francisco".to_string(),
            custodian: "Tommy from Shipping Co.".to_string(),
            timestamp,
            transaction_ref: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_append_assigns_sequences() {
        let log = EventLog::new();
        assert_eq!(log.append(sample_event(1)), 0);
        assert_eq!(log.append(sample_event(2)), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(0).unwrap().timestamp, 1);
        assert!(log.get(2).is_none());
    }

    #[test]
    fn test_events_from_returns_suffix() {
        let log = EventLog::new();
        for t in 1..=4 {
            log.append(sample_event(t));
        }
        let tail = log.events_from(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].timestamp, 3);
        assert!(log.events_from(10).is_empty());
    }

    #[tokio::test]
    async fn test_cursor_yields_committed_then_waits() {
        let log = EventLog::new();
        log.append(sample_event(1));
        log.append(sample_event(2));

        let mut cursor = EventCursor::new(log.clone(), 0);
        assert_eq!(cursor.next().await.timestamp, 1);
        assert_eq!(cursor.next().await.timestamp, 2);
        assert_eq!(cursor.position(), 2);

        // Caught up: next() must wait until the following append.
        let log2 = log.clone();
        let waiter = tokio::spawn(async move {
            let mut cursor = EventCursor::new(log2, 2);
            cursor.next().await.timestamp
        });
        tokio::task::yield_now().await;
        log.append(sample_event(3));
        assert_eq!(waiter.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cursor_restarts_from_committed_position() {
        let log = EventLog::new();
        for t in 1..=3 {
            log.append(sample_event(t));
        }

        let mut cursor = EventCursor::new(log.clone(), 0);
        assert_eq!(cursor.next().await.timestamp, 1);
        let position = cursor.position();
        drop(cursor);

        let mut resumed = EventCursor::new(log, position);
        assert_eq!(resumed.next().await.timestamp, 2);
        assert_eq!(resumed.next().await.timestamp, 3);
    }
}
