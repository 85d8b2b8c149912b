//! Storage capabilities.
//!
//! The engine only ever talks to these traits. `MemoryStore` backs tests;
//! `heirloom-store` provides the SQLite implementation.

use crate::error::StoreError;
use crate::model::{
    ActivityRecord, Address, BeneficiaryClaim, InheritancePlan, LockedPool, PlanId, SwitchTrigger,
    TransferredAsset,
};

/// Plans, their sub-records and the secondary indices.
pub trait PlanStore {
    /// Reserve the next plan id.
    fn next_plan_id(&mut self) -> Result<PlanId, StoreError>;

    /// Insert or replace a plan, refreshing the owner and beneficiary indices.
    fn put_plan(&mut self, plan: &InheritancePlan) -> Result<(), StoreError>;

    fn plan(&self, id: PlanId) -> Result<Option<InheritancePlan>, StoreError>;

    /// All plan ids, ascending.
    fn plan_ids(&self) -> Result<Vec<PlanId>, StoreError>;

    fn plans_by_owner(&self, owner: &Address) -> Result<Vec<PlanId>, StoreError>;

    fn plans_by_beneficiary(&self, beneficiary: &Address) -> Result<Vec<PlanId>, StoreError>;

    fn trigger(&self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError>;

    fn put_trigger(&mut self, trigger: &SwitchTrigger) -> Result<(), StoreError>;

    fn remove_trigger(&mut self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError>;

    /// A plan's claims, ascending by priority.
    fn claims(&self, plan_id: PlanId) -> Result<Vec<BeneficiaryClaim>, StoreError>;

    /// Insert or replace one claim, keyed by `(plan_id, priority)`.
    fn put_claim(&mut self, claim: &BeneficiaryClaim) -> Result<(), StoreError>;

    fn locked_pool(&self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError>;

    fn put_locked_pool(&mut self, pool: &LockedPool) -> Result<(), StoreError>;

    fn remove_locked_pool(&mut self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError>;

    /// Append to the transfer audit log. Records are never rewritten.
    fn append_transfer(&mut self, record: &TransferredAsset) -> Result<(), StoreError>;

    /// A plan's transfer log in append order.
    fn transfers(&self, plan_id: PlanId) -> Result<Vec<TransferredAsset>, StoreError>;
}

/// Last-activity records keyed by address.
pub trait ActivityStore {
    fn activity(&self, address: &Address) -> Result<Option<ActivityRecord>, StoreError>;

    fn put_activity(&mut self, record: &ActivityRecord) -> Result<(), StoreError>;
}

/// Everything the engine persists.
pub trait InheritanceStore: PlanStore + ActivityStore {}

impl<T: PlanStore + ActivityStore + ?Sized> InheritanceStore for T {}
