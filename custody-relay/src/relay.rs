//! At-least-once event forwarding.
//!
//! The relay pulls committed events from a ledger cursor and forwards each
//! one downstream. Delivery is at-least-once: a publish failure is retried
//! until it succeeds (carrying the delivery error alongside the unchanged
//! payload), and an event replayed by a rewound cursor is skipped by its
//! identity before publishing. No event and no error is ever dropped.

use crate::publisher::{Envelope, Publisher};
use custody_core::{EventIdentity, TransitionEvent};
use custody_ledger::EventCursor;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Forwards one package's committed events to a downstream channel.
pub struct EventRelay<P> {
    cursor: EventCursor,
    publisher: P,
    channel: String,
    retry_interval: Duration,
    forwarded: HashSet<EventIdentity>,
}

impl<P: Publisher> EventRelay<P> {
    pub fn new(
        cursor: EventCursor,
        publisher: P,
        channel: impl Into<String>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            cursor,
            publisher,
            channel: channel.into(),
            retry_interval,
            forwarded: HashSet::new(),
        }
    }

    /// Marks events as already forwarded, e.g. by a previous relay run whose
    /// cursor position was rewound.
    pub fn with_forwarded(mut self, seen: impl IntoIterator<Item = EventIdentity>) -> Self {
        self.forwarded.extend(seen);
        self
    }

    /// Runs until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let event = tokio::select! {
                event = self.cursor.next() => event,
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if !self.forwarded.insert(event.identity()) {
                tracing::debug!(
                    package_id = %event.package_id,
                    kind = %event.kind,
                    timestamp = event.timestamp,
                    "duplicate event skipped"
                );
                continue;
            }

            if !self.forward(&event, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(position = self.cursor.position(), "relay stopped");
    }

    /// Publishes one event, retrying until it lands or shutdown is signaled.
    /// Returns false when shutdown interrupted the delivery.
    async fn forward(
        &self,
        event: &Arc<TransitionEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut delivery_error: Option<String> = None;

        loop {
            let envelope = Envelope {
                channel: self.channel.clone(),
                error: delivery_error.clone(),
                details: (**event).clone(),
            };

            match self.publisher.publish(&envelope).await {
                Ok(()) => {
                    tracing::info!(
                        channel = %self.channel,
                        package_id = %event.package_id,
                        kind = %event.kind,
                        "event forwarded"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %self.channel,
                        package_id = %event.package_id,
                        kind = %event.kind,
                        error = %e,
                        "publish failed, will retry"
                    );
                    delivery_error = Some(e.to_string());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryPublisher;
    use custody_core::{
        EventKind, NewShipment, PackageId, ShipmentStatus, SingleOwner, TransitionEngine,
    };
    use custody_ledger::Ledger;

    const OWNER: &str = "owner-1";

    fn sample_shipment() -> NewShipment {
        NewShipment {
            package_id: PackageId::from("1"),
            sender: "Stephen Blum".to_string(),
            recipient: "Ian Jennings".to_string(),
            origin_name: "San Francisco".to_string(),
            destination_name: "Austin".to_string(),
            custodian: "Tommy from Shipping Co.".to_string(),
            departure_time: 1518549958,
        }
    }

    fn setup() -> (
        Arc<Ledger>,
        TransitionEngine<Ledger, SingleOwner>,
        PackageId,
    ) {
        let ledger = Arc::new(Ledger::in_memory());
        let engine = TransitionEngine::new(ledger.clone(), SingleOwner::new(OWNER));
        let pkg = PackageId::from("1");
        engine.create(OWNER, sample_shipment()).unwrap();
        (ledger, engine, pkg)
    }

    async fn run_relay_until_published<P>(
        relay: EventRelay<P>,
        publisher: &MemoryPublisher,
        expected: usize,
    ) where
        P: Publisher + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while publisher.published().len() < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("relay did not publish in time");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_forwards_committed_events_in_order() {
        let (ledger, engine, pkg) = setup();
        engine.depart(OWNER, &pkg, "Tommy from Shipping Co.", 0).unwrap();
        engine.arrive(OWNER, &pkg, "Reno", "Bobby from Shipping Co.", 0).unwrap();
        engine.deliver(OWNER, &pkg, "Austin", "Ian Jennings", 0).unwrap();

        let publisher = MemoryPublisher::new();
        let relay = EventRelay::new(
            ledger.subscribe(&pkg, 0).unwrap(),
            publisher.clone(),
            "custody-events",
            Duration::from_millis(10),
        );
        run_relay_until_published(relay, &publisher, 3).await;

        let published = publisher.published();
        assert_eq!(published.len(), 3);
        let kinds: Vec<EventKind> = published.iter().map(|e| e.details.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Departed, EventKind::Arrived, EventKind::Delivered]
        );
        assert!(published.iter().all(|e| e.channel == "custody-events"));
        assert!(published.iter().all(|e| e.error.is_none()));
    }

    #[tokio::test]
    async fn test_relay_retries_with_delivery_error() {
        let (ledger, engine, pkg) = setup();
        engine.depart(OWNER, &pkg, "Tommy from Shipping Co.", 0).unwrap();

        let publisher = MemoryPublisher::new();
        publisher.fail_times(2);

        let relay = EventRelay::new(
            ledger.subscribe(&pkg, 0).unwrap(),
            publisher.clone(),
            "custody-events",
            Duration::from_millis(5),
        );
        run_relay_until_published(relay, &publisher, 1).await;

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        // The retry that landed carries the error from the failed attempt
        // next to the unchanged payload.
        let error = published[0].error.as_deref().unwrap();
        assert!(error.contains("injected failure"));
        assert_eq!(published[0].details.kind, EventKind::Departed);
        assert_eq!(published[0].details.new_status, ShipmentStatus::Departed);
    }

    #[tokio::test]
    async fn test_relay_skips_already_forwarded_events() {
        let (ledger, engine, pkg) = setup();
        engine.depart(OWNER, &pkg, "Tommy from Shipping Co.", 0).unwrap();
        engine.arrive(OWNER, &pkg, "Reno", "Bobby from Shipping Co.", 0).unwrap();

        let events = ledger.events(&pkg).unwrap().events_from(0);

        // A restarted relay whose cursor was rewound to 0 sees both events
        // again but has already forwarded the first one.
        let publisher = MemoryPublisher::new();
        let relay = EventRelay::new(
            ledger.subscribe(&pkg, 0).unwrap(),
            publisher.clone(),
            "custody-events",
            Duration::from_millis(10),
        )
        .with_forwarded([events[0].identity()]);
        run_relay_until_published(relay, &publisher, 1).await;

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].details.kind, EventKind::Arrived);
    }

    #[tokio::test]
    async fn test_relay_observes_events_committed_while_running() {
        let (ledger, engine, pkg) = setup();

        let publisher = MemoryPublisher::new();
        let relay = EventRelay::new(
            ledger.subscribe(&pkg, 0).unwrap(),
            publisher.clone(),
            "custody-events",
            Duration::from_millis(10),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(shutdown_rx));

        engine.depart(OWNER, &pkg, "Tommy from Shipping Co.", 0).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while publisher.published().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(publisher.published()[0].details.kind, EventKind::Departed);
    }
}
