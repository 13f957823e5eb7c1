//! Shipment record state.

use crate::error::EngineError;
use crate::event::PackageId;
use crate::status::ShipmentStatus;
use crate::substrate::TxContext;
use serde::{Deserialize, Serialize};

/// Immutable creation details for a shipment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    pub package_id: PackageId,
    pub sender: String,
    pub recipient: String,
    pub origin_name: String,
    pub destination_name: String,
    pub custodian: String,
    /// Scheduled departure (unix seconds). Re-stamped when `depart` commits.
    pub departure_time: i64,
}

/// The authoritative state of one tracked shipment.
///
/// Constructed once, mutated only through [`ShipmentRecord::apply_transition`]
/// on the engine's commit path, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    package_id: PackageId,
    sender: String,
    recipient: String,
    origin_name: String,
    destination_name: String,
    custodian: String,
    current_location: String,
    status: ShipmentStatus,
    departure_time: i64,
    last_update_time: i64,
    owner: String,
}

impl ShipmentRecord {
    /// Creates a record in status `Created`, located at its origin.
    ///
    /// All identity and location strings must be non-empty.
    pub fn new(owner: impl Into<String>, details: NewShipment) -> Result<Self, EngineError> {
        let owner = owner.into();
        require_non_empty("owner", &owner)?;
        require_non_empty("package_id", details.package_id.as_str())?;
        require_non_empty("sender", &details.sender)?;
        require_non_empty("recipient", &details.recipient)?;
        require_non_empty("origin_name", &details.origin_name)?;
        require_non_empty("destination_name", &details.destination_name)?;
        require_non_empty("custodian", &details.custodian)?;

        Ok(Self {
            package_id: details.package_id,
            sender: details.sender,
            recipient: details.recipient,
            current_location: details.origin_name.clone(),
            origin_name: details.origin_name,
            destination_name: details.destination_name,
            custodian: details.custodian,
            status: ShipmentStatus::Created,
            departure_time: details.departure_time,
            last_update_time: details.departure_time,
            owner,
        })
    }

    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn custodian(&self) -> &str {
        &self.custodian
    }

    pub fn current_location(&self) -> &str {
        &self.current_location
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn departure_time(&self) -> i64 {
        self.departure_time
    }

    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Applies one committed transition.
    ///
    /// The status must strictly advance along the fixed order; custodian and
    /// location stay non-empty; `last_update_time` never decreases. A
    /// transition to `Departed` re-stamps `departure_time` with the commit
    /// timestamp.
    pub(crate) fn apply_transition(
        &mut self,
        new_status: ShipmentStatus,
        location: Option<&str>,
        custodian: Option<&str>,
        ctx: &TxContext,
    ) -> Result<(), EngineError> {
        if new_status <= self.status {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }
        if let Some(location) = location {
            require_non_empty("location", location)?;
        }
        if let Some(custodian) = custodian {
            require_non_empty("custodian", custodian)?;
        }

        if let Some(location) = location {
            self.current_location = location.to_string();
        }
        if let Some(custodian) = custodian {
            self.custodian = custodian.to_string();
        }

        self.status = new_status;
        self.last_update_time = ctx.timestamp.max(self.last_update_time);
        if new_status == ShipmentStatus::Departed {
            self.departure_time = ctx.timestamp;
        }

        Ok(())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidArgument { field });
    }
    Ok(())
}
