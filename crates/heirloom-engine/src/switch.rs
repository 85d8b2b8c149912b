//! Dead-man switch: trigger, cancel and grace-period expiry.
//!
//! ```text
//! Active --trigger--> Triggered --grace expiry--> ClaimPhase --> Completed
//!   ^                    |
//!   +--owner activity----+   (or explicit CancelTrigger)
//! ```

use crate::activity;
use crate::assets;
use crate::bans::BanGate;
use crate::claims;
use crate::context::StepContext;
use heirloom_core::{
    InheritanceError, InheritanceEvent, PlanId, PlanStatus, SwitchTrigger, TriggerStatus,
};

/// Who cancelled a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// Explicit CancelTrigger message from the owner.
    Owner,
    /// The owner's activity was recorded during the grace period.
    Activity,
}

/// Fire the switch if the plan is Active, its owner is not banned and has
/// been silent for the plan's inactivity period.
///
/// Unmet preconditions are a no-op returning `false`; the sweep calls this
/// speculatively for every Active plan.
pub fn trigger(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<bool, InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if plan.status != PlanStatus::Active {
        return Ok(false);
    }
    if !activity::is_inactive(&*ctx.store, &plan.owner, plan.inactivity_period, ctx.now())? {
        return Ok(false);
    }
    if !BanGate::new(&*ctx.host).owner_may_trigger(&plan.owner) {
        log::debug!("[plan {}] owner {} may not be triggered", plan_id, plan.owner);
        return Ok(false);
    }
    if ctx.store.trigger(plan_id)?.is_some() {
        return Err(InheritanceError::Invariant {
            plan_id,
            detail: "active plan already has a switch trigger".into(),
        });
    }

    let trigger = SwitchTrigger {
        plan_id,
        triggered_at: ctx.at,
        grace_period_ends_at: ctx.now().saturating_add(plan.grace_period),
        status: TriggerStatus::Active,
    };
    ctx.store.put_trigger(&trigger)?;
    plan.status = PlanStatus::Triggered;
    ctx.save_plan(&mut plan)?;

    log::info!(
        "[plan {}] switch triggered for {}; grace period ends at {}",
        plan_id,
        plan.owner,
        trigger.grace_period_ends_at
    );
    ctx.emit(InheritanceEvent::SwitchTriggered {
        plan_id,
        grace_period_ends_at: trigger.grace_period_ends_at,
    });
    Ok(true)
}

/// Delete a Triggered plan's trigger and return it to Active.
///
/// Authorization is the caller's job; a banned owner may still cancel.
pub fn cancel_trigger(
    ctx: &mut StepContext<'_>,
    plan_id: PlanId,
    source: CancelSource,
) -> Result<(), InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if plan.status != PlanStatus::Triggered {
        return Err(InheritanceError::InvalidStatus {
            plan_id,
            status: plan.status,
            action: "cancel trigger",
            expected: "triggered",
        });
    }
    ctx.store
        .remove_trigger(plan_id)?
        .ok_or(InheritanceError::TriggerNotFound(plan_id))?;

    plan.status = PlanStatus::Active;
    ctx.save_plan(&mut plan)?;

    log::info!("[plan {}] switch cancelled ({:?})", plan_id, source);
    ctx.emit(InheritanceEvent::SwitchCancelled {
        plan_id,
        automatic: source == CancelSource::Activity,
    });
    Ok(())
}

/// Once the grace period has passed: lock the owner's holdings, lay out
/// the claim cascade and open the first eligible claim.
pub fn expire_grace_period(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<bool, InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if plan.status != PlanStatus::Triggered {
        return Ok(false);
    }
    let trigger = ctx
        .store
        .trigger(plan_id)?
        .ok_or_else(|| InheritanceError::Invariant {
            plan_id,
            detail: "triggered plan has no switch trigger".into(),
        })?;
    if trigger.status != TriggerStatus::Active || ctx.now() < trigger.grace_period_ends_at {
        return Ok(false);
    }

    // A previous attempt may have locked and laid out part of the cascade
    // before failing; pick up where it stopped.
    assets::lock_or_resume(ctx, &plan)?;
    claims::lay_out(ctx, &plan)?;
    ctx.store.remove_trigger(plan_id)?;
    plan.status = PlanStatus::ClaimPhase;
    ctx.save_plan(&mut plan)?;
    log::info!("[plan {}] grace period over, entering claim phase", plan_id);

    claims::open_next(ctx, &mut plan)?;
    Ok(true)
}
