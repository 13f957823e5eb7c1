//! Transition events appended to the ledger.

use crate::status::ShipmentStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque package identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub String);

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names the transition that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Departed,
    InTransit,
    Arrived,
    Delivered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Departed => "departed",
            EventKind::InTransit => "in_transit",
            EventKind::Arrived => "arrived",
            EventKind::Delivered => "delivered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successful custody transition, immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Which transition produced this event.
    pub kind: EventKind,

    /// Package the event belongs to.
    pub package_id: PackageId,

    /// Status before the transition.
    pub previous_status: ShipmentStatus,

    /// Status after the transition.
    pub new_status: ShipmentStatus,

    /// Location recorded by the transition.
    pub location: String,

    /// Custodian recorded by the transition.
    pub custodian: String,

    /// Commit timestamp assigned by the substrate (unix seconds).
    pub timestamp: i64,

    /// Transaction that produced the event.
    pub transaction_ref: Uuid,
}

impl TransitionEvent {
    /// Returns the identity downstream consumers dedupe on.
    ///
    /// `(package_id, kind, timestamp)` uniquely identifies an event across
    /// at-least-once redelivery.
    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            package_id: self.package_id.clone(),
            kind: self.kind,
            timestamp: self.timestamp,
        }
    }
}

/// Dedupe key for at-least-once delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    pub package_id: PackageId,
    pub kind: EventKind,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(kind: EventKind, timestamp: i64) -> TransitionEvent {
        TransitionEvent {
            kind,
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
    fn test_identity_ignores_transaction_ref() {
        let a = sample_event(EventKind::Departed, 1518549958);
        let mut b = a.clone();
        b.transaction_ref = Uuid::new_v4();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_identity_distinguishes_kind_and_time() {
        let a = sample_event(EventKind::Departed, 100);
        assert_ne!(a.identity(), sample_event(EventKind::Arrived, 100).identity());
        assert_ne!(a.identity(), sample_event(EventKind::Departed, 101).identity());
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = sample_event(EventKind::Delivered, 1518549958);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
