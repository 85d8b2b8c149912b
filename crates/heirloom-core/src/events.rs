//! Events emitted by message handlers and the per-step sweep.

use crate::model::{Address, Amount, AssetId, ClaimStatus, Holding, PlanId};
use serde::{Deserialize, Serialize};

/// Why a beneficiary was passed over in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Banned,
    InvalidAddress,
}

/// Why one transfer item did not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferFailureReason {
    /// The owner no longer holds the locked amount.
    InsufficientFunds {
        #[serde(with = "crate::model::amount_serde")]
        available: Amount,
    },
    /// Everything locked for this asset has already been transferred.
    NothingRemaining,
    /// The asset was never part of the locked snapshot.
    NotLocked,
    /// The ledger or registry refused the transfer.
    Rejected { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InheritanceEvent {
    PlanCreated {
        plan_id: PlanId,
        owner: Address,
    },
    PlanUpdated {
        plan_id: PlanId,
    },
    PlanCancelled {
        plan_id: PlanId,
    },
    PlanCompleted {
        plan_id: PlanId,
    },
    SwitchTriggered {
        plan_id: PlanId,
        grace_period_ends_at: u64,
    },
    SwitchCancelled {
        plan_id: PlanId,
        /// True when the owner's activity cancelled it rather than a message.
        automatic: bool,
    },
    ClaimWindowOpened {
        plan_id: PlanId,
        beneficiary: Address,
        closes_at: u64,
    },
    ClaimWindowClosed {
        plan_id: PlanId,
        beneficiary: Address,
        status: ClaimStatus,
    },
    AssetsClaimed {
        plan_id: PlanId,
        beneficiary: Address,
        items: Vec<Holding>,
    },
    BeneficiarySkipped {
        plan_id: PlanId,
        beneficiary: Address,
        reason: SkipReason,
    },
    AssetsRoutedToFallback {
        plan_id: PlanId,
        recipient: Address,
        reference: String,
        items: Vec<Holding>,
    },
    TransferFailed {
        plan_id: PlanId,
        recipient: Address,
        asset: AssetId,
        #[serde(with = "crate::model::amount_serde")]
        amount: Amount,
        reason: TransferFailureReason,
    },
}

impl InheritanceEvent {
    pub fn plan_id(&self) -> PlanId {
        match self {
            InheritanceEvent::PlanCreated { plan_id, .. }
            | InheritanceEvent::PlanUpdated { plan_id }
            | InheritanceEvent::PlanCancelled { plan_id }
            | InheritanceEvent::PlanCompleted { plan_id }
            | InheritanceEvent::SwitchTriggered { plan_id, .. }
            | InheritanceEvent::SwitchCancelled { plan_id, .. }
            | InheritanceEvent::ClaimWindowOpened { plan_id, .. }
            | InheritanceEvent::ClaimWindowClosed { plan_id, .. }
            | InheritanceEvent::AssetsClaimed { plan_id, .. }
            | InheritanceEvent::BeneficiarySkipped { plan_id, .. }
            | InheritanceEvent::AssetsRoutedToFallback { plan_id, .. }
            | InheritanceEvent::TransferFailed { plan_id, .. } => *plan_id,
        }
    }

    /// Short machine name, used as the event log's type column.
    pub fn name(&self) -> &'static str {
        match self {
            InheritanceEvent::PlanCreated { .. } => "plan_created",
            InheritanceEvent::PlanUpdated { .. } => "plan_updated",
            InheritanceEvent::PlanCancelled { .. } => "plan_cancelled",
            InheritanceEvent::PlanCompleted { .. } => "plan_completed",
            InheritanceEvent::SwitchTriggered { .. } => "switch_triggered",
            InheritanceEvent::SwitchCancelled { .. } => "switch_cancelled",
            InheritanceEvent::ClaimWindowOpened { .. } => "claim_window_opened",
            InheritanceEvent::ClaimWindowClosed { .. } => "claim_window_closed",
            InheritanceEvent::AssetsClaimed { .. } => "assets_claimed",
            InheritanceEvent::BeneficiarySkipped { .. } => "beneficiary_skipped",
            InheritanceEvent::AssetsRoutedToFallback { .. } => "assets_routed_to_fallback",
            InheritanceEvent::TransferFailed { .. } => "transfer_failed",
        }
    }

    /// Policy cascades and partial transfer failures, worth an operator's look.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            InheritanceEvent::BeneficiarySkipped { .. } | InheritanceEvent::TransferFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_plan_id_and_name() {
        let event = InheritanceEvent::SwitchTriggered {
            plan_id: 4,
            grace_period_ends_at: 1_700_000_000,
        };
        assert_eq!(event.plan_id(), 4);
        assert_eq!(event.name(), "switch_triggered");
        assert!(!event.is_anomaly());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = InheritanceEvent::BeneficiarySkipped {
            plan_id: 2,
            beneficiary: Address::from("heir1bob"),
            reason: SkipReason::Banned,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "beneficiary_skipped");
        assert_eq!(json["reason"], "banned");
        assert!(event.is_anomaly());

        let restored: InheritanceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored, event);
    }
}
