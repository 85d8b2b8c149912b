//! Inheritance messages and their stateless validation.

use heirloom_core::{
    Address, AddressValidator, AssetKind, Beneficiary, InheritanceParams, PlanId, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreatePlan {
    pub beneficiaries: Vec<Beneficiary>,
    pub inactivity_period: u64,
    pub grace_period: u64,
    pub claim_window_duration: u64,
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdatePlan {
    pub plan_id: PlanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<Vec<Beneficiary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactivity_period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_window_duration: Option<u64>,
}

impl MsgUpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.beneficiaries.is_none()
            && self.inactivity_period.is_none()
            && self.grace_period.is_none()
            && self.claim_window_duration.is_none()
    }
}

/// Every message the inheritance handler accepts, as queued by a host.
///
/// ```json
/// {"type": "claim_assets", "plan_id": 7, "beneficiary": "heir1alice"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InheritanceMsg {
    CreatePlan(MsgCreatePlan),
    UpdatePlan(MsgUpdatePlan),
    CancelPlan { plan_id: PlanId },
    CancelTrigger { plan_id: PlanId },
    ClaimAssets { plan_id: PlanId, beneficiary: Address },
}

impl InheritanceMsg {
    pub fn name(&self) -> &'static str {
        match self {
            InheritanceMsg::CreatePlan(_) => "create_plan",
            InheritanceMsg::UpdatePlan(_) => "update_plan",
            InheritanceMsg::CancelPlan { .. } => "cancel_plan",
            InheritanceMsg::CancelTrigger { .. } => "cancel_trigger",
            InheritanceMsg::ClaimAssets { .. } => "claim_assets",
        }
    }
}

/// Plan terms after an update has been merged in, ready to validate.
#[derive(Debug, Clone, Copy)]
pub struct PlanTerms<'a> {
    pub owner: &'a Address,
    pub beneficiaries: &'a [Beneficiary],
    pub inactivity_period: u64,
    pub grace_period: u64,
    pub claim_window_duration: u64,
}

impl<'a> PlanTerms<'a> {
    pub fn of_create(owner: &'a Address, msg: &'a MsgCreatePlan) -> Self {
        Self {
            owner,
            beneficiaries: &msg.beneficiaries,
            inactivity_period: msg.inactivity_period,
            grace_period: msg.grace_period,
            claim_window_duration: msg.claim_window_duration,
        }
    }
}

/// Check plan terms against the protocol parameters.
pub fn validate_terms(
    terms: &PlanTerms<'_>,
    params: &InheritanceParams,
    addresses: &dyn AddressValidator,
) -> Result<(), ValidationError> {
    validate_address(addresses, terms.owner)?;

    if terms.grace_period < params.min_grace_period {
        return Err(ValidationError::GracePeriodTooShort {
            min: params.min_grace_period,
            got: terms.grace_period,
        });
    }
    if terms.inactivity_period < params.min_inactivity_period {
        return Err(ValidationError::InactivityPeriodTooShort {
            min: params.min_inactivity_period,
            got: terms.inactivity_period,
        });
    }
    if terms.claim_window_duration < params.min_claim_window {
        return Err(ValidationError::ClaimWindowTooShort {
            min: params.min_claim_window,
            got: terms.claim_window_duration,
        });
    }
    if terms.beneficiaries.len() > params.max_beneficiaries {
        return Err(ValidationError::TooManyBeneficiaries {
            max: params.max_beneficiaries,
            got: terms.beneficiaries.len(),
        });
    }

    let total: u32 = terms
        .beneficiaries
        .iter()
        .map(|b| b.allocation_percent as u32)
        .sum();
    if total > 100 {
        return Err(ValidationError::AllocationExceeded { total });
    }

    let mut priorities = BTreeSet::new();
    let mut seen = BTreeSet::new();
    for b in terms.beneficiaries {
        validate_address(addresses, &b.address)?;
        if &b.address == terms.owner {
            return Err(ValidationError::OwnerAsBeneficiary(b.address.clone()));
        }
        if !priorities.insert(b.priority) {
            return Err(ValidationError::DuplicatePriority(b.priority));
        }
        if !seen.insert(&b.address) {
            return Err(ValidationError::DuplicateBeneficiary(b.address.clone()));
        }
        if b.allocation_percent == 0 && b.specific_assets.is_empty() {
            return Err(ValidationError::EmptyAllocation(b.address.clone()));
        }
        for asset in &b.specific_assets {
            let id = asset.asset_id();
            if asset.amount == 0 {
                return Err(ValidationError::ZeroAmount {
                    beneficiary: b.address.clone(),
                    asset: id,
                });
            }
            let well_formed = match asset.kind {
                AssetKind::Equity => id.equity_parts().is_some(),
                AssetKind::Native | AssetKind::Custom => {
                    !asset.identifier.is_empty() && !asset.identifier.contains(char::is_whitespace)
                }
            };
            if !well_formed {
                return Err(ValidationError::InvalidAssetIdentifier(id));
            }
        }
    }
    Ok(())
}

pub fn validate_address(
    addresses: &dyn AddressValidator,
    address: &Address,
) -> Result<(), ValidationError> {
    addresses
        .validate(address)
        .map_err(|reason| ValidationError::InvalidAddress {
            address: address.clone(),
            reason,
        })
}

/// Beneficiaries sorted by ascending priority, as plans store them.
pub fn ordered(mut beneficiaries: Vec<Beneficiary>) -> Vec<Beneficiary> {
    beneficiaries.sort_by_key(|b| b.priority);
    beneficiaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::params::SECONDS_PER_DAY;
    use heirloom_core::{PrefixValidator, SpecificAsset};

    fn params() -> InheritanceParams {
        InheritanceParams::with_fallback("heir1charity")
    }

    fn beneficiary(address: &str, priority: u32, pct: u8) -> Beneficiary {
        Beneficiary {
            address: Address::from(address),
            priority,
            allocation_percent: pct,
            specific_assets: Vec::new(),
        }
    }

    fn create(beneficiaries: Vec<Beneficiary>) -> MsgCreatePlan {
        MsgCreatePlan {
            beneficiaries,
            inactivity_period: 180 * SECONDS_PER_DAY,
            grace_period: 30 * SECONDS_PER_DAY,
            claim_window_duration: 7 * SECONDS_PER_DAY,
        }
    }

    fn check(msg: &MsgCreatePlan) -> Result<(), ValidationError> {
        let owner = Address::from("heir1owner");
        validate_terms(
            &PlanTerms::of_create(&owner, msg),
            &params(),
            &PrefixValidator::new("heir1"),
        )
    }

    #[test]
    fn test_grace_period_floor() {
        let mut msg = create(vec![beneficiary("heir1alice", 1, 100)]);
        assert!(check(&msg).is_ok());

        msg.grace_period = 30 * SECONDS_PER_DAY - 1;
        assert_eq!(
            check(&msg),
            Err(ValidationError::GracePeriodTooShort {
                min: 30 * SECONDS_PER_DAY,
                got: 30 * SECONDS_PER_DAY - 1,
            })
        );
    }

    #[test]
    fn test_allocation_and_priorities() {
        let msg = create(vec![
            beneficiary("heir1alice", 1, 60),
            beneficiary("heir1bob", 2, 41),
        ]);
        assert_eq!(
            check(&msg),
            Err(ValidationError::AllocationExceeded { total: 101 })
        );

        let msg = create(vec![
            beneficiary("heir1alice", 1, 50),
            beneficiary("heir1bob", 1, 50),
        ]);
        assert_eq!(check(&msg), Err(ValidationError::DuplicatePriority(1)));

        let msg = create(vec![
            beneficiary("heir1alice", 1, 50),
            beneficiary("heir1alice", 2, 50),
        ]);
        assert!(matches!(
            check(&msg),
            Err(ValidationError::DuplicateBeneficiary(_))
        ));
    }

    #[test]
    fn test_too_many_beneficiaries() {
        let list = (0..11)
            .map(|i| beneficiary(&format!("heir1b{}", i), i, 1))
            .collect();
        assert_eq!(
            check(&create(list)),
            Err(ValidationError::TooManyBeneficiaries { max: 10, got: 11 })
        );
    }

    #[test]
    fn test_beneficiary_rules() {
        assert!(matches!(
            check(&create(vec![beneficiary("heir1owner", 1, 10)])),
            Err(ValidationError::OwnerAsBeneficiary(_))
        ));
        assert!(matches!(
            check(&create(vec![beneficiary("cosmos1alice", 1, 10)])),
            Err(ValidationError::InvalidAddress { .. })
        ));
        assert!(matches!(
            check(&create(vec![beneficiary("heir1alice", 1, 0)])),
            Err(ValidationError::EmptyAllocation(_))
        ));

        let mut pinned = beneficiary("heir1alice", 1, 0);
        pinned.specific_assets.push(SpecificAsset {
            kind: AssetKind::Equity,
            identifier: "acme".into(),
            amount: 500,
        });
        assert!(matches!(
            check(&create(vec![pinned.clone()])),
            Err(ValidationError::InvalidAssetIdentifier(_))
        ));

        pinned.specific_assets[0].identifier = "acme/common".into();
        assert!(check(&create(vec![pinned.clone()])).is_ok());

        pinned.specific_assets[0].amount = 0;
        assert!(matches!(
            check(&create(vec![pinned])),
            Err(ValidationError::ZeroAmount { .. })
        ));
    }

    #[test]
    fn test_msg_json_shape() {
        let msg: InheritanceMsg = serde_json::from_str(
            r#"{"type":"claim_assets","plan_id":7,"beneficiary":"heir1alice"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InheritanceMsg::ClaimAssets {
                plan_id: 7,
                beneficiary: Address::from("heir1alice"),
            }
        );

        let msg: InheritanceMsg =
            serde_json::from_str(r#"{"type":"update_plan","plan_id":3,"grace_period":2592000}"#)
                .unwrap();
        assert_eq!(msg.name(), "update_plan");
        match msg {
            InheritanceMsg::UpdatePlan(update) => {
                assert_eq!(update.grace_period, Some(2_592_000));
                assert!(update.beneficiaries.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
