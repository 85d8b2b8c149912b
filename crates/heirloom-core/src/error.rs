//! Error taxonomy.
//!
//! Validation, authorization and not-found errors reject a message before
//! any state changes. Policy cascades (banned participants) and partial
//! transfer failures are not errors: they surface as events.

use crate::model::{Address, Amount, AssetId, PlanId, PlanStatus};
use thiserror::Error;

/// Malformed message content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("grace period {got}s is below the protocol minimum of {min}s")]
    GracePeriodTooShort { min: u64, got: u64 },

    #[error("inactivity period {got}s is below the protocol minimum of {min}s")]
    InactivityPeriodTooShort { min: u64, got: u64 },

    #[error("claim window {got}s is below the protocol minimum of {min}s")]
    ClaimWindowTooShort { min: u64, got: u64 },

    #[error("allocations sum to {total}%, more than 100%")]
    AllocationExceeded { total: u32 },

    #[error("{got} beneficiaries exceeds the maximum of {max}")]
    TooManyBeneficiaries { max: usize, got: usize },

    #[error("priority {0} is used by more than one beneficiary")]
    DuplicatePriority(u32),

    #[error("beneficiary {0} is listed more than once")]
    DuplicateBeneficiary(Address),

    #[error("owner {0} cannot be their own beneficiary")]
    OwnerAsBeneficiary(Address),

    #[error("beneficiary {0} has neither a percentage nor specific assets")]
    EmptyAllocation(Address),

    #[error("specific asset {asset} for {beneficiary} has zero amount")]
    ZeroAmount { beneficiary: Address, asset: AssetId },

    #[error("malformed asset identifier {0}")]
    InvalidAssetIdentifier(AssetId),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: Address, reason: String },

    #[error("update changes nothing")]
    EmptyUpdate,
}

/// Failure reported by an external collaborator (ledger, registry, bans).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{owner} holds {available} of {asset}, needs {required}")]
    InsufficientFunds {
        owner: Address,
        asset: AssetId,
        available: Amount,
        required: Amount,
    },

    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Persistence failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum InheritanceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{signer} is not authorized to {action} plan {plan_id}")]
    Unauthorized {
        signer: Address,
        action: &'static str,
        plan_id: PlanId,
    },

    #[error("plan {0} not found")]
    PlanNotFound(PlanId),

    #[error("plan {0} has no active switch trigger")]
    TriggerNotFound(PlanId),

    #[error("plan {plan_id} has no open claim for {beneficiary}")]
    ClaimNotOpen { plan_id: PlanId, beneficiary: Address },

    #[error("plan {plan_id} is {status}; {action} requires {expected}")]
    InvalidStatus {
        plan_id: PlanId,
        status: PlanStatus,
        action: &'static str,
        expected: &'static str,
    },

    #[error("claim window for {beneficiary} on plan {plan_id} closed at {closed_at}")]
    ClaimWindowClosed {
        plan_id: PlanId,
        beneficiary: Address,
        closed_at: u64,
    },

    #[error("invariant violated on plan {plan_id}: {detail}")]
    Invariant { plan_id: PlanId, detail: String },

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl InheritanceError {
    /// Rejections caused by the message itself rather than the system.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            InheritanceError::Validation(_)
                | InheritanceError::Unauthorized { .. }
                | InheritanceError::PlanNotFound(_)
                | InheritanceError::TriggerNotFound(_)
                | InheritanceError::ClaimNotOpen { .. }
                | InheritanceError::InvalidStatus { .. }
                | InheritanceError::ClaimWindowClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err: InheritanceError = ValidationError::GracePeriodTooShort {
            min: 2_592_000,
            got: 60,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "validation failed: grace period 60s is below the protocol minimum of 2592000s"
        );
        assert!(err.is_rejection());

        let err = InheritanceError::from(StoreError::Corrupt("plan 7".into()));
        assert!(!err.is_rejection());
    }
}
