//! End-of-step sweep.
//!
//! The host calls [`advance`] once per execution step, after that step's
//! messages. Four passes run over every plan in ascending id order:
//!
//! 1. trigger Active plans whose owner went silent
//! 2. expire elapsed grace periods
//! 3. expire elapsed claim windows
//! 4. route dormant owners' holdings to the fallback recipient
//!
//! One plan's failure is logged and collected; the sweep moves on.
//! Re-running the sweep at the same time with no state change does nothing.

use crate::activity;
use crate::assets;
use crate::claims;
use crate::context::StepContext;
use crate::switch;
use heirloom_core::{BlockTime, InheritanceError, InheritanceEvent, PlanId};
use serde::Serialize;
use std::fmt;

pub const DORMANCY_REFERENCE: &str = "dormancy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    ListPlans,
    Trigger,
    GraceExpiry,
    ClaimExpiry,
    Dormancy,
}

impl fmt::Display for SweepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SweepStage::ListPlans => "list plans",
            SweepStage::Trigger => "trigger",
            SweepStage::GraceExpiry => "grace expiry",
            SweepStage::ClaimExpiry => "claim expiry",
            SweepStage::Dormancy => "dormancy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepError {
    /// `None` when the sweep could not even list plans.
    pub plan_id: Option<PlanId>,
    pub stage: SweepStage,
    pub message: String,
}

/// Everything one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub at: BlockTime,
    pub events: Vec<InheritanceEvent>,
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

type Pass = fn(&mut StepContext<'_>, PlanId) -> Result<bool, InheritanceError>;

/// Run the four passes and hand back the events and per-plan errors.
pub fn advance(mut ctx: StepContext<'_>) -> SweepReport {
    let at = ctx.at;
    let mut errors = Vec::new();

    let passes: [(SweepStage, Pass); 4] = [
        (SweepStage::Trigger, switch::trigger),
        (SweepStage::GraceExpiry, switch::expire_grace_period),
        (SweepStage::ClaimExpiry, claims::expire_claim_window),
        (SweepStage::Dormancy, route_dormant),
    ];

    for (stage, pass) in passes {
        // Re-listed per pass so plans touched earlier are seen in their
        // new state.
        let ids = match ctx.store.plan_ids() {
            Ok(ids) => ids,
            Err(e) => {
                log::error!("Sweep at height {} could not list plans: {}", at.height, e);
                errors.push(SweepError {
                    plan_id: None,
                    stage: SweepStage::ListPlans,
                    message: e.to_string(),
                });
                break;
            }
        };

        for plan_id in ids {
            if let Err(e) = pass(&mut ctx, plan_id) {
                log::error!("[plan {}] {} failed: {}", plan_id, stage, e);
                errors.push(SweepError {
                    plan_id: Some(plan_id),
                    stage,
                    message: e.to_string(),
                });
            }
        }
    }

    let events = ctx.into_events();
    if !events.is_empty() || !errors.is_empty() {
        log::info!(
            "Sweep at height {}: {} event(s), {} error(s)",
            at.height,
            events.len(),
            errors.len()
        );
    }
    SweepReport { at, events, errors }
}

/// Safety net for plans whose owner has been silent for the dormancy
/// period, whatever state the plan is in short of terminal: lock what is
/// left (unless already locked), expire every unresolved claim and route
/// the whole remainder to the fallback recipient.
pub fn route_dormant(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<bool, InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if plan.status.is_terminal() {
        return Ok(false);
    }
    if !activity::is_inactive(&*ctx.store, &plan.owner, ctx.params.dormancy_period, ctx.now())? {
        return Ok(false);
    }

    log::warn!(
        "[plan {}] owner {} dormant for {}s, routing holdings to fallback",
        plan_id,
        plan.owner,
        ctx.params.dormancy_period
    );
    if ctx.store.locked_pool(plan_id)?.is_none() {
        assets::lock(ctx, &plan)?;
    }
    claims::expire_unresolved(ctx, plan_id)?;
    claims::complete(ctx, &mut plan, DORMANCY_REFERENCE)?;
    Ok(true)
}
