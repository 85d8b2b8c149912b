//! Activity tracking and the false-positive safeguard.
//!
//! Any state-changing action by an address refreshes its record. If that
//! address owns a triggered plan, the trigger is deleted in the same
//! transition, before any later sweep can look at the plan.

use crate::context::StepContext;
use crate::switch::{self, CancelSource};
use heirloom_core::{
    ActivityRecord, ActivityStore, Address, BlockTime, InheritanceError, InheritanceEvent,
    PlanStatus, StoreError,
};

/// Record activity for `address` at the context's block time.
///
/// Last write wins, except that a record from a lower height never
/// replaces a newer one.
pub fn record_activity(ctx: &mut StepContext<'_>, address: &Address) -> Result<(), InheritanceError> {
    let at = ctx.at;
    if let Some(existing) = ctx.store.activity(address)? {
        if existing.last_activity_height > at.height {
            log::debug!(
                "Ignoring stale activity for {} at height {} (have {})",
                address,
                at.height,
                existing.last_activity_height
            );
            return Ok(());
        }
    }

    ctx.store.put_activity(&ActivityRecord {
        address: address.clone(),
        last_activity_height: at.height,
        last_activity_time: at.time,
    })?;

    for plan_id in ctx.store.plans_by_owner(address)? {
        let plan = ctx.load_plan(plan_id)?;
        if plan.status == PlanStatus::Triggered {
            log::info!(
                "[plan {}] owner {} is active again, cancelling switch",
                plan_id,
                address
            );
            switch::cancel_trigger(ctx, plan_id, CancelSource::Activity)?;
        }
    }
    Ok(())
}

/// Hook every subsystem that authenticates a signer must call, so the
/// signer's activity is recorded and any trigger on their plans cancelled.
pub trait ActivityObserver {
    fn record_activity(
        &mut self,
        address: &Address,
        at: BlockTime,
    ) -> Result<Vec<InheritanceEvent>, InheritanceError>;
}

/// True when `address` has been silent for at least `period` seconds at
/// `now`. An address with no record counts as inactive since genesis.
pub fn is_inactive<S>(store: &S, address: &Address, period: u64, now: u64) -> Result<bool, StoreError>
where
    S: ActivityStore + ?Sized,
{
    Ok(match store.activity(address)? {
        None => true,
        Some(record) => now.saturating_sub(record.last_activity_time) >= period,
    })
}
