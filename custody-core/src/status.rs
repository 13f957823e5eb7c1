//! Shipment status and its fixed total order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Custody status of a shipment.
///
/// The derived `Ord` follows declaration order, so a legal transition is
/// exactly a strict increase: `Created < Departed < InTransit < Arrived <
/// Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Record exists, package not yet handed off.
    Created,
    /// Package left the origin with a carrier custodian.
    Departed,
    /// Package is moving between waypoints.
    InTransit,
    /// Package reached a waypoint or the destination facility.
    Arrived,
    /// Package handed to the recipient. Terminal.
    Delivered,
}

impl ShipmentStatus {
    /// Returns the status name as used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::Departed => "departed",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Arrived => "arrived",
            ShipmentStatus::Delivered => "delivered",
        }
    }

    /// Returns true if no further transition may leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
