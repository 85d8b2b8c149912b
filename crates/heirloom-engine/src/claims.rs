//! Cascading beneficiary claims.
//!
//! Claims are laid out once, in priority order, when the grace period
//! expires. Exactly one claim is Open at a time; resolving it (claimed,
//! skipped or expired) opens the next Pending one. When none remain, what
//! is left of the locked pool goes to the fallback recipient and the plan
//! completes.
//!
//! Allocation: pinned specific assets come out of the pool first; the
//! percentage share of each locked asset is `floor(base * pct / 100)` of
//! the lock-time percentage base, so claim order never changes a share.
//! Rounding dust and every unclaimed share end up with the fallback.

use crate::assets::{self, TransferOutcome};
use crate::bans::{BanGate, Eligibility};
use crate::context::StepContext;
use heirloom_core::{
    Address, Amount, AssetId, Beneficiary, BeneficiaryClaim, ClaimStatus, Holding,
    InheritanceError, InheritanceEvent, InheritancePlan, LockedPool, PlanId, PlanStatus,
    SkipReason, TransferredAsset,
};
use std::collections::{BTreeMap, BTreeSet};

pub const FALLBACK_REFERENCE: &str = "fallback";

/// What a ClaimAssets message achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(TransferOutcome),
    /// The claimant turned out to be ineligible; the cascade moved on.
    Skipped(SkipReason),
}

pub fn claim_reference(priority: u32) -> String {
    format!("claim:{}", priority)
}

/// `floor(base * percent / 100)` without overflowing.
pub fn percent_of(base: Amount, percent: u8) -> Amount {
    let percent = percent as Amount;
    (base / 100)
        .saturating_mul(percent)
        .saturating_add((base % 100) * percent / 100)
}

/// Everything `beneficiary` is entitled to out of `pool`: their pinned
/// assets, then their percentage of each locked asset's base.
pub fn entitlement(beneficiary: &Beneficiary, pool: &LockedPool) -> Vec<Holding> {
    let mut items: Vec<Holding> = beneficiary
        .specific_assets
        .iter()
        .filter(|s| s.amount > 0)
        .map(|s| Holding::new(s.asset_id(), s.amount))
        .collect();

    if beneficiary.allocation_percent > 0 {
        items.extend(pool.items.iter().filter_map(|item| {
            let share = percent_of(item.percentage_base, beneficiary.allocation_percent);
            (share > 0).then(|| Holding::new(item.asset.clone(), share))
        }));
    }
    items
}

/// Clip `items` in order against what remains of `pool` after `log`.
pub fn clip_to_pool(items: Vec<Holding>, pool: &LockedPool, log: &[TransferredAsset]) -> Vec<Holding> {
    let mut left: BTreeMap<AssetId, Amount> = pool
        .items
        .iter()
        .map(|i| (i.asset.clone(), assets::remaining(pool, log, &i.asset)))
        .collect();

    items
        .into_iter()
        .filter_map(|item| {
            let available = left.get_mut(&item.asset)?;
            let amount = item.amount.min(*available);
            *available -= amount;
            (amount > 0).then(|| Holding::new(item.asset, amount))
        })
        .collect()
}

/// Create one Pending claim per beneficiary, in priority order. Claims
/// that already exist are left as they are, so an interrupted layout can
/// be finished by a later sweep.
pub fn lay_out(ctx: &mut StepContext<'_>, plan: &InheritancePlan) -> Result<(), InheritanceError> {
    let existing: BTreeSet<u32> = ctx
        .store
        .claims(plan.id)?
        .iter()
        .map(|c| c.priority)
        .collect();
    let mut ordered: Vec<&Beneficiary> = plan.beneficiaries.iter().collect();
    ordered.sort_by_key(|b| b.priority);
    for beneficiary in ordered {
        if existing.contains(&beneficiary.priority) {
            continue;
        }
        ctx.store
            .put_claim(&BeneficiaryClaim::pending(plan.id, beneficiary))?;
    }
    Ok(())
}

/// Open the next eligible Pending claim, skipping ineligible ones. With no
/// Pending claims left, route the remainder to the fallback and complete.
///
/// Returns the beneficiary whose window opened, if any.
pub fn open_next(
    ctx: &mut StepContext<'_>,
    plan: &mut InheritancePlan,
) -> Result<Option<Address>, InheritanceError> {
    let claims = ctx.store.claims(plan.id)?;
    if claims.iter().any(|c| c.status == ClaimStatus::Open) {
        return Err(InheritanceError::Invariant {
            plan_id: plan.id,
            detail: "a claim is already open".into(),
        });
    }

    for mut claim in claims
        .into_iter()
        .filter(|c| c.status == ClaimStatus::Pending)
    {
        let eligibility =
            BanGate::new(&*ctx.host).beneficiary_eligibility(ctx.addresses, &claim.beneficiary);
        match eligibility {
            Eligibility::Skip(reason) => skip(ctx, &mut claim, reason)?,
            Eligibility::Eligible => {
                let now = ctx.now();
                let closes_at = now.saturating_add(plan.claim_window_duration);
                claim.status = ClaimStatus::Open;
                claim.window_opens_at = Some(now);
                claim.window_closes_at = Some(closes_at);
                ctx.store.put_claim(&claim)?;

                log::info!(
                    "[plan {}] claim window open for {} (priority {}) until {}",
                    plan.id,
                    claim.beneficiary,
                    claim.priority,
                    closes_at
                );
                ctx.emit(InheritanceEvent::ClaimWindowOpened {
                    plan_id: plan.id,
                    beneficiary: claim.beneficiary.clone(),
                    closes_at,
                });
                return Ok(Some(claim.beneficiary));
            }
        }
    }

    complete(ctx, plan, FALLBACK_REFERENCE)?;
    Ok(None)
}

fn skip(
    ctx: &mut StepContext<'_>,
    claim: &mut BeneficiaryClaim,
    reason: SkipReason,
) -> Result<(), InheritanceError> {
    claim.status = ClaimStatus::Skipped;
    ctx.store.put_claim(claim)?;

    log::warn!(
        "[plan {}] skipping beneficiary {} (priority {}): {:?}",
        claim.plan_id,
        claim.beneficiary,
        claim.priority,
        reason
    );
    ctx.emit(InheritanceEvent::BeneficiarySkipped {
        plan_id: claim.plan_id,
        beneficiary: claim.beneficiary.clone(),
        reason,
    });
    ctx.emit(InheritanceEvent::ClaimWindowClosed {
        plan_id: claim.plan_id,
        beneficiary: claim.beneficiary.clone(),
        status: ClaimStatus::Skipped,
    });
    Ok(())
}

/// A beneficiary claims during their open window.
///
/// A banned claimant is not an error: the claim is Skipped and the cascade
/// continues immediately. A failed ban lookup rejects the claim so it can
/// be retried inside the window.
pub fn claim(
    ctx: &mut StepContext<'_>,
    plan_id: PlanId,
    beneficiary: &Address,
    caller: &Address,
) -> Result<ClaimOutcome, InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if caller != beneficiary {
        return Err(InheritanceError::Unauthorized {
            signer: caller.clone(),
            action: "claim on",
            plan_id,
        });
    }
    if plan.status != PlanStatus::ClaimPhase {
        return Err(InheritanceError::InvalidStatus {
            plan_id,
            status: plan.status,
            action: "claim",
            expected: "claim_phase",
        });
    }

    let mut claim = ctx
        .store
        .claims(plan_id)?
        .into_iter()
        .find(|c| c.status == ClaimStatus::Open && &c.beneficiary == beneficiary)
        .ok_or_else(|| InheritanceError::ClaimNotOpen {
            plan_id,
            beneficiary: beneficiary.clone(),
        })?;

    let closes_at = claim.window_closes_at.unwrap_or(0);
    if ctx.now() > closes_at {
        return Err(InheritanceError::ClaimWindowClosed {
            plan_id,
            beneficiary: beneficiary.clone(),
            closed_at: closes_at,
        });
    }

    if BanGate::new(&*ctx.host).is_banned(beneficiary)? {
        skip(ctx, &mut claim, SkipReason::Banned)?;
        open_next(ctx, &mut plan)?;
        return Ok(ClaimOutcome::Skipped(SkipReason::Banned));
    }

    let pool = ctx
        .store
        .locked_pool(plan_id)?
        .ok_or_else(|| InheritanceError::Invariant {
            plan_id,
            detail: "claim phase without a locked pool".into(),
        })?;
    let entry = plan
        .beneficiary(beneficiary)
        .cloned()
        .ok_or_else(|| InheritanceError::Invariant {
            plan_id,
            detail: format!("open claim for {} who is not a beneficiary", beneficiary),
        })?;

    let items = entitlement(&entry, &pool);
    let outcome = assets::transfer(
        ctx,
        plan_id,
        beneficiary,
        items,
        &claim_reference(claim.priority),
    )?;

    claim.status = ClaimStatus::Claimed;
    ctx.store.put_claim(&claim)?;

    log::info!(
        "[plan {}] {} claimed {} item(s){}",
        plan_id,
        beneficiary,
        outcome.moved.len(),
        if outcome.is_partial() { " (partial)" } else { "" }
    );
    ctx.emit(InheritanceEvent::AssetsClaimed {
        plan_id,
        beneficiary: beneficiary.clone(),
        items: outcome.moved.clone(),
    });
    ctx.emit(InheritanceEvent::ClaimWindowClosed {
        plan_id,
        beneficiary: beneficiary.clone(),
        status: ClaimStatus::Claimed,
    });

    open_next(ctx, &mut plan)?;
    Ok(ClaimOutcome::Claimed(outcome))
}

/// Expire the Open claim once its window has passed and cascade.
pub fn expire_claim_window(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<bool, InheritanceError> {
    let mut plan = ctx.load_plan(plan_id)?;
    if plan.status != PlanStatus::ClaimPhase {
        return Ok(false);
    }

    let open = ctx
        .store
        .claims(plan_id)?
        .into_iter()
        .find(|c| c.status == ClaimStatus::Open);

    let Some(mut claim) = open else {
        // Nothing open in claim phase: resume the cascade.
        log::warn!("[plan {}] claim phase with no open claim, resuming cascade", plan_id);
        open_next(ctx, &mut plan)?;
        return Ok(true);
    };
    if !claim.window_elapsed(ctx.now()) {
        return Ok(false);
    }

    claim.status = ClaimStatus::Expired;
    ctx.store.put_claim(&claim)?;
    log::info!(
        "[plan {}] claim window for {} expired unclaimed",
        plan_id,
        claim.beneficiary
    );
    ctx.emit(InheritanceEvent::ClaimWindowClosed {
        plan_id,
        beneficiary: claim.beneficiary.clone(),
        status: ClaimStatus::Expired,
    });

    open_next(ctx, &mut plan)?;
    Ok(true)
}

/// Mark every Pending or Open claim Expired. Only the Open one gets a
/// `ClaimWindowClosed` event; Pending windows never opened.
pub fn expire_unresolved(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<(), InheritanceError> {
    for mut claim in ctx.store.claims(plan_id)? {
        if claim.status.is_resolved() {
            continue;
        }
        let was_open = claim.status == ClaimStatus::Open;
        claim.status = ClaimStatus::Expired;
        ctx.store.put_claim(&claim)?;
        if was_open {
            ctx.emit(InheritanceEvent::ClaimWindowClosed {
                plan_id,
                beneficiary: claim.beneficiary.clone(),
                status: ClaimStatus::Expired,
            });
        }
    }
    Ok(())
}

/// Route whatever is left in the locked pool to the fallback recipient,
/// release the lock and mark the plan Completed.
pub fn complete(
    ctx: &mut StepContext<'_>,
    plan: &mut InheritancePlan,
    reference: &str,
) -> Result<(), InheritanceError> {
    let params = ctx.params;
    if let Some(pool) = ctx.store.locked_pool(plan.id)? {
        let log = ctx.store.transfers(plan.id)?;
        let leftovers: Vec<Holding> = pool
            .items
            .iter()
            .map(|i| Holding::new(i.asset.clone(), assets::remaining(&pool, &log, &i.asset)))
            .filter(|h| h.amount > 0)
            .collect();

        if !leftovers.is_empty() {
            let outcome =
                assets::transfer(ctx, plan.id, &params.fallback_recipient, leftovers, reference)?;
            if !outcome.moved.is_empty() {
                log::info!(
                    "[plan {}] routed {} item(s) to fallback {}",
                    plan.id,
                    outcome.moved.len(),
                    params.fallback_recipient
                );
                ctx.emit(InheritanceEvent::AssetsRoutedToFallback {
                    plan_id: plan.id,
                    recipient: params.fallback_recipient.clone(),
                    reference: reference.to_string(),
                    items: outcome.moved,
                });
            }
        }
    }

    assets::unlock(ctx, plan.id)?;
    ctx.store.remove_trigger(plan.id)?;
    plan.status = PlanStatus::Completed;
    ctx.save_plan(plan)?;

    log::info!("[plan {}] completed", plan.id);
    ctx.emit(InheritanceEvent::PlanCompleted { plan_id: plan.id });
    Ok(())
}
