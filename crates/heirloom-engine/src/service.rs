//! The inheritance message handler and query surface.
//!
//! `InheritanceService` owns a store and a host, validates each message
//! before touching state, runs it as one transition and records the
//! signer's activity once it succeeds. Hosts drive time by calling
//! [`InheritanceService::advance`] after each step's messages.

use crate::activity::{self, ActivityObserver};
use crate::assets;
use crate::claims::{self, ClaimOutcome};
use crate::context::StepContext;
use crate::heartbeat::{self, HeartbeatConfig, HeartbeatStatus};
use crate::msgs::{self, InheritanceMsg, MsgCreatePlan, MsgUpdatePlan, PlanTerms};
use crate::scheduler::{self, SweepReport};
use crate::switch::{self, CancelSource};
use heirloom_core::params::ParamsError;
use heirloom_core::{
    ActivityRecord, Address, AddressValidator, BeneficiaryClaim, BlockTime, Holding, Host,
    InheritanceError, InheritanceEvent, InheritanceParams, InheritancePlan, InheritanceStore,
    LockedPool, PlanId, PlanStatus, PrefixValidator, StoreError, SwitchTrigger,
    TransferredAsset, ValidationError,
};

pub struct InheritanceService<S, H> {
    store: S,
    host: H,
    addresses: Box<dyn AddressValidator>,
    params: InheritanceParams,
    heartbeat: HeartbeatConfig,
}

impl<S: InheritanceStore, H: Host> InheritanceService<S, H> {
    /// Validates `params` and checks addresses against their prefix.
    pub fn new(store: S, host: H, params: InheritanceParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self {
            store,
            host,
            addresses: Box::new(PrefixValidator::new(params.address_prefix.clone())),
            params,
            heartbeat: HeartbeatConfig::default(),
        })
    }

    pub fn with_validator(mut self, addresses: impl AddressValidator + 'static) -> Self {
        self.addresses = Box::new(addresses);
        self
    }

    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn params(&self) -> &InheritanceParams {
        &self.params
    }

    pub fn heartbeat_config(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    pub fn into_parts(self) -> (S, H) {
        (self.store, self.host)
    }

    fn context(&mut self, at: BlockTime) -> StepContext<'_> {
        StepContext::new(
            &mut self.store,
            &mut self.host,
            self.addresses.as_ref(),
            &self.params,
            at,
        )
    }

    /// Run `apply` as one transition, then record `signer`'s activity.
    fn execute<T, F>(
        &mut self,
        signer: &Address,
        at: BlockTime,
        apply: F,
    ) -> Result<(T, Vec<InheritanceEvent>), InheritanceError>
    where
        F: FnOnce(&mut StepContext<'_>) -> Result<T, InheritanceError>,
    {
        let mut ctx = self.context(at);
        let value = apply(&mut ctx)?;
        activity::record_activity(&mut ctx, signer)?;
        Ok((value, ctx.into_events()))
    }

    fn owned_plan(
        &self,
        signer: &Address,
        plan_id: PlanId,
        action: &'static str,
    ) -> Result<InheritancePlan, InheritanceError> {
        let plan = self
            .store
            .plan(plan_id)?
            .ok_or(InheritanceError::PlanNotFound(plan_id))?;
        if &plan.owner != signer {
            return Err(InheritanceError::Unauthorized {
                signer: signer.clone(),
                action,
                plan_id,
            });
        }
        Ok(plan)
    }

    // ── Messages ───────────────────────────────────────────────────────

    pub fn create_plan(
        &mut self,
        owner: &Address,
        msg: MsgCreatePlan,
        at: BlockTime,
    ) -> Result<(PlanId, Vec<InheritanceEvent>), InheritanceError> {
        msgs::validate_terms(
            &PlanTerms::of_create(owner, &msg),
            &self.params,
            self.addresses.as_ref(),
        )?;

        self.execute(owner, at, |ctx| {
            let id = ctx.store.next_plan_id()?;
            let mut plan = InheritancePlan {
                id,
                owner: owner.clone(),
                beneficiaries: msgs::ordered(msg.beneficiaries),
                inactivity_period: msg.inactivity_period,
                grace_period: msg.grace_period,
                claim_window_duration: msg.claim_window_duration,
                status: PlanStatus::Active,
                created_at: at,
                updated_at: at,
            };
            ctx.save_plan(&mut plan)?;

            log::info!(
                "[plan {}] created by {} with {} beneficiary(ies)",
                id,
                owner,
                plan.beneficiaries.len()
            );
            ctx.emit(InheritanceEvent::PlanCreated {
                plan_id: id,
                owner: owner.clone(),
            });
            Ok(id)
        })
    }

    pub fn update_plan(
        &mut self,
        signer: &Address,
        msg: MsgUpdatePlan,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError> {
        if msg.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        let mut plan = self.owned_plan(signer, msg.plan_id, "update")?;
        if plan.status != PlanStatus::Active {
            return Err(InheritanceError::InvalidStatus {
                plan_id: plan.id,
                status: plan.status,
                action: "update",
                expected: "active",
            });
        }

        if let Some(beneficiaries) = msg.beneficiaries {
            plan.beneficiaries = msgs::ordered(beneficiaries);
        }
        plan.inactivity_period = msg.inactivity_period.unwrap_or(plan.inactivity_period);
        plan.grace_period = msg.grace_period.unwrap_or(plan.grace_period);
        plan.claim_window_duration = msg
            .claim_window_duration
            .unwrap_or(plan.claim_window_duration);

        msgs::validate_terms(
            &PlanTerms {
                owner: &plan.owner,
                beneficiaries: &plan.beneficiaries,
                inactivity_period: plan.inactivity_period,
                grace_period: plan.grace_period,
                claim_window_duration: plan.claim_window_duration,
            },
            &self.params,
            self.addresses.as_ref(),
        )?;

        let (_, events) = self.execute(signer, at, |ctx| {
            ctx.save_plan(&mut plan)?;
            log::info!("[plan {}] updated", plan.id);
            ctx.emit(InheritanceEvent::PlanUpdated { plan_id: plan.id });
            Ok(())
        })?;
        Ok(events)
    }

    /// Cancel a plan that has not completed. A pending trigger is dropped,
    /// an open claim expires and any lock is released.
    pub fn cancel_plan(
        &mut self,
        signer: &Address,
        plan_id: PlanId,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError> {
        let mut plan = self.owned_plan(signer, plan_id, "cancel")?;
        if plan.status.is_terminal() {
            return Err(InheritanceError::InvalidStatus {
                plan_id,
                status: plan.status,
                action: "cancel",
                expected: "active, triggered or claim_phase",
            });
        }

        let (_, events) = self.execute(signer, at, |ctx| {
            ctx.store.remove_trigger(plan_id)?;
            claims::expire_unresolved(ctx, plan_id)?;
            assets::unlock(ctx, plan_id)?;
            plan.status = PlanStatus::Cancelled;
            ctx.save_plan(&mut plan)?;

            log::info!("[plan {}] cancelled by owner", plan_id);
            ctx.emit(InheritanceEvent::PlanCancelled { plan_id });
            Ok(())
        })?;
        Ok(events)
    }

    /// Owner explicitly cancels a pending trigger. Allowed even for a
    /// banned owner.
    pub fn cancel_trigger(
        &mut self,
        signer: &Address,
        plan_id: PlanId,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError> {
        self.owned_plan(signer, plan_id, "cancel the trigger of")?;
        let (_, events) = self.execute(signer, at, |ctx| {
            switch::cancel_trigger(ctx, plan_id, CancelSource::Owner)
        })?;
        Ok(events)
    }

    pub fn claim_assets(
        &mut self,
        signer: &Address,
        plan_id: PlanId,
        beneficiary: &Address,
        at: BlockTime,
    ) -> Result<(ClaimOutcome, Vec<InheritanceEvent>), InheritanceError> {
        self.execute(signer, at, |ctx| {
            claims::claim(ctx, plan_id, beneficiary, signer)
        })
    }

    /// Dispatch a queued message.
    pub fn deliver(
        &mut self,
        signer: &Address,
        msg: InheritanceMsg,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError> {
        msgs::validate_address(self.addresses.as_ref(), signer)?;
        log::debug!("Delivering {} from {} at height {}", msg.name(), signer, at.height);
        match msg {
            InheritanceMsg::CreatePlan(create) => {
                self.create_plan(signer, create, at).map(|(_, events)| events)
            }
            InheritanceMsg::UpdatePlan(update) => self.update_plan(signer, update, at),
            InheritanceMsg::CancelPlan { plan_id } => self.cancel_plan(signer, plan_id, at),
            InheritanceMsg::CancelTrigger { plan_id } => self.cancel_trigger(signer, plan_id, at),
            InheritanceMsg::ClaimAssets {
                plan_id,
                beneficiary,
            } => self
                .claim_assets(signer, plan_id, &beneficiary, at)
                .map(|(_, events)| events),
        }
    }

    /// End-of-step sweep.
    pub fn advance(&mut self, at: BlockTime) -> SweepReport {
        scheduler::advance(self.context(at))
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn plan(&self, plan_id: PlanId) -> Result<Option<InheritancePlan>, StoreError> {
        self.store.plan(plan_id)
    }

    pub fn plans_by_owner(&self, owner: &Address) -> Result<Vec<InheritancePlan>, StoreError> {
        self.load_all(self.store.plans_by_owner(owner)?)
    }

    pub fn plans_by_beneficiary(
        &self,
        beneficiary: &Address,
    ) -> Result<Vec<InheritancePlan>, StoreError> {
        self.load_all(self.store.plans_by_beneficiary(beneficiary)?)
    }

    fn load_all(&self, ids: Vec<PlanId>) -> Result<Vec<InheritancePlan>, StoreError> {
        let mut plans = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(plan) = self.store.plan(id)? {
                plans.push(plan);
            }
        }
        Ok(plans)
    }

    pub fn trigger(&self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError> {
        self.store.trigger(plan_id)
    }

    pub fn claims(&self, plan_id: PlanId) -> Result<Vec<BeneficiaryClaim>, StoreError> {
        self.store.claims(plan_id)
    }

    pub fn transfers(&self, plan_id: PlanId) -> Result<Vec<TransferredAsset>, StoreError> {
        self.store.transfers(plan_id)
    }

    pub fn locked_pool(&self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError> {
        self.store.locked_pool(plan_id)
    }

    pub fn activity(&self, address: &Address) -> Result<Option<ActivityRecord>, StoreError> {
        self.store.activity(address)
    }

    /// What `beneficiary` would receive if they claimed now.
    ///
    /// Before the grace period ends there is no lock yet; the preview is
    /// then computed against the owner's current holdings, less what their
    /// other plans have already locked.
    pub fn claim_preview(
        &self,
        plan_id: PlanId,
        beneficiary: &Address,
    ) -> Result<Vec<Holding>, InheritanceError> {
        let plan = self
            .store
            .plan(plan_id)?
            .ok_or(InheritanceError::PlanNotFound(plan_id))?;
        let Some(entry) = plan.beneficiary(beneficiary) else {
            return Ok(Vec::new());
        };
        if plan.status.is_terminal() {
            return Ok(Vec::new());
        }
        let resolved = self
            .store
            .claims(plan_id)?
            .iter()
            .any(|c| &c.beneficiary == beneficiary && c.status.is_resolved());
        if resolved {
            return Ok(Vec::new());
        }

        let (pool, log) = match self.store.locked_pool(plan_id)? {
            Some(pool) => (pool, self.store.transfers(plan_id)?),
            None => {
                let holdings = assets::lockable_holdings(
                    &self.store,
                    &self.host,
                    &self.params.native_denom,
                    &plan,
                )?;
                (assets::snapshot(&plan, holdings, plan.updated_at), Vec::new())
            }
        };
        Ok(claims::clip_to_pool(
            claims::entitlement(entry, &pool),
            &pool,
            &log,
        ))
    }

    pub fn heartbeat(&self, plan_id: PlanId, now: u64) -> Result<HeartbeatStatus, InheritanceError> {
        let plan = self
            .store
            .plan(plan_id)?
            .ok_or(InheritanceError::PlanNotFound(plan_id))?;
        let activity = self.store.activity(&plan.owner)?;
        Ok(heartbeat::evaluate_heartbeat(
            &plan,
            activity.as_ref(),
            now,
            &self.heartbeat,
        ))
    }

    /// Heartbeats of every Active plan, most urgent first.
    pub fn heartbeats(&self, now: u64) -> Result<Vec<HeartbeatStatus>, StoreError> {
        let mut entries = Vec::new();
        for id in self.store.plan_ids()? {
            let Some(plan) = self.store.plan(id)? else {
                continue;
            };
            if plan.status != PlanStatus::Active {
                continue;
            }
            let activity = self.store.activity(&plan.owner)?;
            entries.push((plan, activity));
        }
        Ok(heartbeat::evaluate_batch(&entries, now, &self.heartbeat))
    }
}

impl<S: InheritanceStore, H: Host> ActivityObserver for InheritanceService<S, H> {
    fn record_activity(
        &mut self,
        address: &Address,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError> {
        let mut ctx = self.context(at);
        activity::record_activity(&mut ctx, address)?;
        Ok(ctx.into_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, day, service_with_plan, Service, OWNER};
    use heirloom_core::ClaimStatus;

    #[test]
    fn test_create_records_owner_activity() {
        let (service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        let plan = service.plan(plan_id).unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(
            service.activity(&addr(OWNER)).unwrap().unwrap().last_activity_height,
            1
        );
        assert_eq!(service.plans_by_owner(&addr(OWNER)).unwrap().len(), 1);
        assert_eq!(
            service.plans_by_beneficiary(&addr("heir1alice")).unwrap()[0].id,
            plan_id
        );
    }

    #[test]
    fn test_only_owner_may_update_or_cancel() {
        let (mut service, plan_id): (Service, _) = service_with_plan(&[("heir1alice", 1, 100)]);
        let intruder = addr("heir1mallory");
        let update = MsgUpdatePlan {
            plan_id,
            grace_period: Some(day(60)),
            ..Default::default()
        };

        let err = service
            .update_plan(&intruder, update.clone(), BlockTime::new(2, day(1)))
            .unwrap_err();
        assert!(matches!(err, InheritanceError::Unauthorized { .. }));
        let err = service
            .cancel_plan(&intruder, plan_id, BlockTime::new(2, day(1)))
            .unwrap_err();
        assert!(err.is_rejection());
        // Rejections do not count as activity
        assert!(service.activity(&intruder).unwrap().is_none());

        let events = service
            .update_plan(&addr(OWNER), update, BlockTime::new(3, day(2)))
            .unwrap();
        assert_eq!(events, vec![InheritanceEvent::PlanUpdated { plan_id }]);
        assert_eq!(service.plan(plan_id).unwrap().unwrap().grace_period, day(60));
    }

    #[test]
    fn test_empty_update_rejected() {
        let (mut service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        let err = service
            .update_plan(
                &addr(OWNER),
                MsgUpdatePlan {
                    plan_id,
                    ..Default::default()
                },
                BlockTime::new(2, day(1)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            InheritanceError::Validation(ValidationError::EmptyUpdate)
        ));
    }

    #[test]
    fn test_cancel_twice_rejected() {
        let (mut service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        let owner = addr(OWNER);
        service
            .cancel_plan(&owner, plan_id, BlockTime::new(2, day(1)))
            .unwrap();
        let err = service
            .cancel_plan(&owner, plan_id, BlockTime::new(3, day(2)))
            .unwrap_err();
        assert!(matches!(err, InheritanceError::InvalidStatus { .. }));
    }

    #[test]
    fn test_cancel_in_claim_phase_releases_lock() {
        let (mut service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        // 180d inactivity, then 30d grace
        service.advance(BlockTime::new(2, day(181)));
        service.advance(BlockTime::new(3, day(212)));
        assert_eq!(
            service.plan(plan_id).unwrap().unwrap().status,
            PlanStatus::ClaimPhase
        );
        assert!(service.locked_pool(plan_id).unwrap().is_some());

        let events = service
            .cancel_plan(&addr(OWNER), plan_id, BlockTime::new(4, day(213)))
            .unwrap();
        assert!(events.contains(&InheritanceEvent::PlanCancelled { plan_id }));
        assert!(service.locked_pool(plan_id).unwrap().is_none());
        assert_eq!(
            service.claims(plan_id).unwrap()[0].status,
            ClaimStatus::Expired
        );
        assert!(service.transfers(plan_id).unwrap().is_empty());
    }

    #[test]
    fn test_deliver_rejects_invalid_signer() {
        let (mut service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        let err = service
            .deliver(
                &addr("cosmos1owner"),
                InheritanceMsg::CancelPlan { plan_id },
                BlockTime::new(2, day(1)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            InheritanceError::Validation(ValidationError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_claim_preview_before_lock_uses_holdings() {
        let (service, plan_id) = service_with_plan(&[("heir1alice", 1, 60), ("heir1bob", 2, 40)]);
        let preview = service.claim_preview(plan_id, &addr("heir1alice")).unwrap();
        assert_eq!(
            preview,
            vec![Holding::new(heirloom_core::AssetId::native("uheir"), 600)]
        );
        assert!(service
            .claim_preview(plan_id, &addr("heir1nobody"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_observer_cancels_trigger() {
        let (mut service, plan_id) = service_with_plan(&[("heir1alice", 1, 100)]);
        service.advance(BlockTime::new(2, day(181)));
        assert!(service.trigger(plan_id).unwrap().is_some());

        let events = service
            .record_activity(&addr(OWNER), BlockTime::new(3, day(182)))
            .unwrap();
        assert_eq!(
            events,
            vec![InheritanceEvent::SwitchCancelled {
                plan_id,
                automatic: true
            }]
        );
        assert!(service.trigger(plan_id).unwrap().is_none());
    }
}
