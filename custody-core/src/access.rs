//! Caller authorization.
//!
//! The custody model has a single fixed authority: the identity that created
//! the record is the only one allowed to move it. The policy is a trait so a
//! multi-party custody scheme can replace it without touching the engine.

use crate::error::EngineError;

/// Decides whether a caller may invoke a mutating operation.
pub trait AccessPolicy {
    fn authorize(&self, caller: &str) -> Result<(), EngineError>;
}

/// Single fixed authority: exactly one configured owner identity.
#[derive(Debug, Clone)]
pub struct SingleOwner {
    owner: String,
}

impl SingleOwner {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl AccessPolicy for SingleOwner {
    fn authorize(&self, caller: &str) -> Result<(), EngineError> {
        if caller != self.owner {
            return Err(EngineError::Unauthorized {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_authorized() {
        let policy = SingleOwner::new("0xabc");
        assert!(policy.authorize("0xabc").is_ok());
    }

    #[test]
    fn test_other_caller_is_rejected() {
        let policy = SingleOwner::new("0xabc");
        let err = policy.authorize("0xdef").unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { caller } if caller == "0xdef"));
    }

    #[test]
    fn test_identity_match_is_exact() {
        let policy = SingleOwner::new("Owner");
        assert!(policy.authorize("owner").is_err());
        assert!(policy.authorize("Owner ").is_err());
        assert!(policy.authorize("").is_err());
    }
}
