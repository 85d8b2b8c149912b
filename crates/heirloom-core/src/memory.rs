//! In-memory implementations of every capability trait.
//!
//! Deterministic (BTreeMap-ordered) so sweeps over them are reproducible.

use crate::error::{HostError, StoreError};
use crate::host::{BalanceLedger, BanRegistry, EquityHolding, EquityRegistry};
use crate::model::{
    ActivityRecord, Address, Amount, AssetId, BeneficiaryClaim, InheritancePlan, LockedPool,
    PlanId, SwitchTrigger, TransferredAsset,
};
use crate::store::{ActivityStore, PlanStore};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    last_plan_id: PlanId,
    plans: BTreeMap<PlanId, InheritancePlan>,
    by_owner: BTreeMap<Address, BTreeSet<PlanId>>,
    by_beneficiary: BTreeMap<Address, BTreeSet<PlanId>>,
    triggers: BTreeMap<PlanId, SwitchTrigger>,
    claims: BTreeMap<PlanId, BTreeMap<u32, BeneficiaryClaim>>,
    locks: BTreeMap<PlanId, LockedPool>,
    transfers: BTreeMap<PlanId, Vec<TransferredAsset>>,
    activity: BTreeMap<Address, ActivityRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&mut self, plan: &InheritancePlan) {
        if let Some(ids) = self.by_owner.get_mut(&plan.owner) {
            ids.remove(&plan.id);
        }
        for b in &plan.beneficiaries {
            if let Some(ids) = self.by_beneficiary.get_mut(&b.address) {
                ids.remove(&plan.id);
            }
        }
    }
}

impl PlanStore for MemoryStore {
    fn next_plan_id(&mut self) -> Result<PlanId, StoreError> {
        self.last_plan_id += 1;
        Ok(self.last_plan_id)
    }

    fn put_plan(&mut self, plan: &InheritancePlan) -> Result<(), StoreError> {
        if let Some(previous) = self.plans.get(&plan.id).cloned() {
            self.unindex(&previous);
        }
        self.by_owner
            .entry(plan.owner.clone())
            .or_default()
            .insert(plan.id);
        for b in &plan.beneficiaries {
            self.by_beneficiary
                .entry(b.address.clone())
                .or_default()
                .insert(plan.id);
        }
        self.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    fn plan(&self, id: PlanId) -> Result<Option<InheritancePlan>, StoreError> {
        Ok(self.plans.get(&id).cloned())
    }

    fn plan_ids(&self) -> Result<Vec<PlanId>, StoreError> {
        Ok(self.plans.keys().copied().collect())
    }

    fn plans_by_owner(&self, owner: &Address) -> Result<Vec<PlanId>, StoreError> {
        Ok(self
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    fn plans_by_beneficiary(&self, beneficiary: &Address) -> Result<Vec<PlanId>, StoreError> {
        Ok(self
            .by_beneficiary
            .get(beneficiary)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    fn trigger(&self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError> {
        Ok(self.triggers.get(&plan_id).cloned())
    }

    fn put_trigger(&mut self, trigger: &SwitchTrigger) -> Result<(), StoreError> {
        self.triggers.insert(trigger.plan_id, trigger.clone());
        Ok(())
    }

    fn remove_trigger(&mut self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError> {
        Ok(self.triggers.remove(&plan_id))
    }

    fn claims(&self, plan_id: PlanId) -> Result<Vec<BeneficiaryClaim>, StoreError> {
        Ok(self
            .claims
            .get(&plan_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    fn put_claim(&mut self, claim: &BeneficiaryClaim) -> Result<(), StoreError> {
        self.claims
            .entry(claim.plan_id)
            .or_default()
            .insert(claim.priority, claim.clone());
        Ok(())
    }

    fn locked_pool(&self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError> {
        Ok(self.locks.get(&plan_id).cloned())
    }

    fn put_locked_pool(&mut self, pool: &LockedPool) -> Result<(), StoreError> {
        self.locks.insert(pool.plan_id, pool.clone());
        Ok(())
    }

    fn remove_locked_pool(&mut self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError> {
        Ok(self.locks.remove(&plan_id))
    }

    fn append_transfer(&mut self, record: &TransferredAsset) -> Result<(), StoreError> {
        self.transfers
            .entry(record.plan_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn transfers(&self, plan_id: PlanId) -> Result<Vec<TransferredAsset>, StoreError> {
        Ok(self.transfers.get(&plan_id).cloned().unwrap_or_default())
    }
}

impl ActivityStore for MemoryStore {
    fn activity(&self, address: &Address) -> Result<Option<ActivityRecord>, StoreError> {
        Ok(self.activity.get(address).cloned())
    }

    fn put_activity(&mut self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.activity.insert(record.address.clone(), record.clone());
        Ok(())
    }
}

/// Balance ledger, equity registry and ban list in one in-memory host.
#[derive(Debug, Default, Clone)]
pub struct MemoryHost {
    balances: BTreeMap<Address, BTreeMap<String, Amount>>,
    shares: BTreeMap<Address, BTreeMap<(String, String), Amount>>,
    banned: BTreeSet<Address>,
    bans_unavailable: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, owner: &Address, denom: &str, amount: Amount) {
        let entry = self
            .balances
            .entry(owner.clone())
            .or_default()
            .entry(denom.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn issue_shares(&mut self, owner: &Address, company_id: &str, class_id: &str, shares: Amount) {
        let entry = self
            .shares
            .entry(owner.clone())
            .or_default()
            .entry((company_id.to_string(), class_id.to_string()))
            .or_insert(0);
        *entry = entry.saturating_add(shares);
    }

    pub fn shares(&self, owner: &Address, company_id: &str, class_id: &str) -> Amount {
        self.shares
            .get(owner)
            .and_then(|s| s.get(&(company_id.to_string(), class_id.to_string())))
            .copied()
            .unwrap_or(0)
    }

    pub fn ban(&mut self, address: &Address) {
        self.banned.insert(address.clone());
    }

    pub fn unban(&mut self, address: &Address) {
        self.banned.remove(address);
    }

    /// Make every ban query fail, as if the registry were unreachable.
    pub fn set_bans_unavailable(&mut self, unavailable: bool) {
        self.bans_unavailable = unavailable;
    }
}

impl BalanceLedger for MemoryHost {
    fn balance(&self, owner: &Address, denom: &str) -> Result<Amount, HostError> {
        Ok(self
            .balances
            .get(owner)
            .and_then(|b| b.get(denom))
            .copied()
            .unwrap_or(0))
    }

    fn balances(&self, owner: &Address) -> Result<Vec<(String, Amount)>, HostError> {
        Ok(self
            .balances
            .get(owner)
            .map(|b| {
                b.iter()
                    .filter(|(_, amount)| **amount > 0)
                    .map(|(denom, amount)| (denom.clone(), *amount))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), HostError> {
        let available = self.balance(from, denom)?;
        if available < amount {
            return Err(HostError::InsufficientFunds {
                owner: from.clone(),
                asset: AssetId::custom(denom),
                available,
                required: amount,
            });
        }
        if let Some(b) = self.balances.get_mut(from).and_then(|b| b.get_mut(denom)) {
            *b -= amount;
        }
        self.mint(to, denom, amount);
        Ok(())
    }
}

impl EquityRegistry for MemoryHost {
    fn holdings_by_owner(&self, owner: &Address) -> Result<Vec<EquityHolding>, HostError> {
        Ok(self
            .shares
            .get(owner)
            .map(|s| {
                s.iter()
                    .filter(|(_, shares)| **shares > 0)
                    .map(|((company_id, class_id), shares)| EquityHolding {
                        company_id: company_id.clone(),
                        class_id: class_id.clone(),
                        shares: *shares,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        company_id: &str,
        class_id: &str,
        shares: Amount,
    ) -> Result<(), HostError> {
        let available = self.shares(from, company_id, class_id);
        if available < shares {
            return Err(HostError::InsufficientFunds {
                owner: from.clone(),
                asset: AssetId::equity(company_id, class_id),
                available,
                required: shares,
            });
        }
        if let Some(s) = self
            .shares
            .get_mut(from)
            .and_then(|s| s.get_mut(&(company_id.to_string(), class_id.to_string())))
        {
            *s -= shares;
        }
        self.issue_shares(to, company_id, class_id, shares);
        Ok(())
    }
}

impl BanRegistry for MemoryHost {
    fn is_banned(&self, address: &Address) -> Result<bool, HostError> {
        if self.bans_unavailable {
            return Err(HostError::Unavailable("ban registry offline".into()));
        }
        Ok(self.banned.contains(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Beneficiary, BlockTime, PlanStatus};

    fn plan(id: PlanId, owner: &str, heirs: &[&str]) -> InheritancePlan {
        InheritancePlan {
            id,
            owner: Address::from(owner),
            beneficiaries: heirs
                .iter()
                .enumerate()
                .map(|(i, a)| Beneficiary {
                    address: Address::from(*a),
                    priority: i as u32 + 1,
                    allocation_percent: 10,
                    specific_assets: vec![],
                })
                .collect(),
            inactivity_period: 1,
            grace_period: 1,
            claim_window_duration: 1,
            status: PlanStatus::Active,
            created_at: BlockTime::default(),
            updated_at: BlockTime::default(),
        }
    }

    #[test]
    fn test_indices_follow_updates() {
        let mut store = MemoryStore::new();
        let id = store.next_plan_id().unwrap();
        assert_eq!(id, 1);

        store
            .put_plan(&plan(id, "heir1owner", &["heir1alice", "heir1bob"]))
            .unwrap();
        assert_eq!(store.plans_by_owner(&"heir1owner".into()).unwrap(), vec![1]);
        assert_eq!(store.plans_by_beneficiary(&"heir1bob".into()).unwrap(), vec![1]);

        // Replacing the beneficiary list drops the stale index entry
        store.put_plan(&plan(id, "heir1owner", &["heir1carol"])).unwrap();
        assert!(store.plans_by_beneficiary(&"heir1bob".into()).unwrap().is_empty());
        assert_eq!(store.plans_by_beneficiary(&"heir1carol".into()).unwrap(), vec![1]);
    }

    #[test]
    fn test_claims_ordered_by_priority() {
        let mut store = MemoryStore::new();
        let p = plan(1, "heir1owner", &["heir1alice", "heir1bob", "heir1carol"]);
        for b in p.beneficiaries.iter().rev() {
            store.put_claim(&BeneficiaryClaim::pending(1, b)).unwrap();
        }
        let priorities: Vec<u32> = store.claims(1).unwrap().iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[test]
    fn test_host_send_and_insufficient_funds() {
        let mut host = MemoryHost::new();
        let alice = Address::from("heir1alice");
        let bob = Address::from("heir1bob");
        host.mint(&alice, "uheir", 100);

        host.send(&alice, &bob, "uheir", 40).unwrap();
        assert_eq!(host.balance(&alice, "uheir").unwrap(), 60);
        assert_eq!(host.balance(&bob, "uheir").unwrap(), 40);

        let err = host.send(&alice, &bob, "uheir", 61).unwrap_err();
        assert!(matches!(err, HostError::InsufficientFunds { available: 60, .. }));
    }

    #[test]
    fn test_host_shares_and_bans() {
        let mut host = MemoryHost::new();
        let alice = Address::from("heir1alice");
        let bob = Address::from("heir1bob");
        host.issue_shares(&alice, "acme", "common", 500);
        host.transfer_shares(&alice, &bob, "acme", "common", 500).unwrap();
        assert!(host.holdings_by_owner(&alice).unwrap().is_empty());
        assert_eq!(host.shares(&bob, "acme", "common"), 500);

        host.ban(&bob);
        assert!(host.is_banned(&bob).unwrap());
        host.set_bans_unavailable(true);
        assert!(host.is_banned(&bob).is_err());
    }
}
