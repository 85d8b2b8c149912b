//! Asset transfer engine.
//!
//! Resolves an owner's holdings across the balance ledger and the equity
//! registry, freezes them into a plan's locked pool at grace-period expiry,
//! and moves items out of that pool one at a time. Each item is its own
//! atomic operation: a failed item is recorded and skipped, never rolled
//! back together with its siblings.
//!
//! A lock only takes what the owner's other live plans have not already
//! locked. A transfer moves at most what the owner still holds, so a
//! partly spent asset is split rather than failed.

use crate::context::StepContext;
use heirloom_core::{
    transferred_total, Address, Amount, AssetId, AssetKind, BalanceLedger, BlockTime,
    EquityRegistry, Holding, Host, HostError, InheritanceError, InheritanceEvent,
    InheritancePlan, LockedItem, LockedPool, PlanId, PlanStore, StoreError,
    TransferFailureReason, TransferredAsset,
};
use std::collections::BTreeMap;

/// One item that did not move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub recipient: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub reason: TransferFailureReason,
}

/// Result of a multi-item transfer: what moved and what didn't.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    pub moved: Vec<Holding>,
    pub failures: Vec<TransferFailure>,
}

impl TransferOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Everything `owner` holds across the ledger and the equity registry,
/// ordered by asset kind (native, equity, custom) then identifier.
pub fn get_holdings<H>(host: &H, native_denom: &str, owner: &Address) -> Result<Vec<Holding>, HostError>
where
    H: BalanceLedger + EquityRegistry + ?Sized,
{
    let mut holdings: Vec<Holding> = host
        .balances(owner)?
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(denom, amount)| {
            let kind = if denom == native_denom {
                AssetKind::Native
            } else {
                AssetKind::Custom
            };
            Holding::new(AssetId::new(kind, denom), amount)
        })
        .collect();

    holdings.extend(
        host.holdings_by_owner(owner)?
            .into_iter()
            .filter(|h| h.shares > 0)
            .map(|h| Holding::new(AssetId::equity(&h.company_id, &h.class_id), h.shares)),
    );

    holdings.sort_by(|a, b| a.asset.cmp(&b.asset));
    Ok(holdings)
}

/// Build (without persisting) the locked pool `holdings` would produce.
///
/// Each item's percentage base excludes what beneficiaries have pinned as
/// specific assets.
pub fn snapshot(plan: &InheritancePlan, holdings: Vec<Holding>, at: BlockTime) -> LockedPool {
    let items = holdings
        .into_iter()
        .map(|h| {
            let pinned = plan.pinned_total(&h.asset);
            LockedItem {
                percentage_base: h.amount.saturating_sub(pinned),
                amount: h.amount,
                asset: h.asset,
            }
        })
        .collect();
    LockedPool {
        plan_id: plan.id,
        owner: plan.owner.clone(),
        locked_at: at,
        items,
    }
}

/// What the owner's other live plans still hold locked, per asset.
pub fn earmarked_elsewhere<S>(
    store: &S,
    plan: &InheritancePlan,
) -> Result<BTreeMap<AssetId, Amount>, StoreError>
where
    S: PlanStore + ?Sized,
{
    let mut earmarked: BTreeMap<AssetId, Amount> = BTreeMap::new();
    for other_id in store.plans_by_owner(&plan.owner)? {
        if other_id == plan.id {
            continue;
        }
        let Some(pool) = store.locked_pool(other_id)? else {
            continue;
        };
        let live = store
            .plan(other_id)?
            .is_some_and(|other| !other.status.is_terminal());
        if !live {
            continue;
        }
        let log = store.transfers(other_id)?;
        for item in &pool.items {
            let entry = earmarked.entry(item.asset.clone()).or_insert(0);
            *entry = entry.saturating_add(remaining(&pool, &log, &item.asset));
        }
    }
    Ok(earmarked)
}

/// The owner's holdings minus everything their other live plans have
/// already locked.
pub fn lockable_holdings<S, H>(
    store: &S,
    host: &H,
    native_denom: &str,
    plan: &InheritancePlan,
) -> Result<Vec<Holding>, InheritanceError>
where
    S: PlanStore + ?Sized,
    H: BalanceLedger + EquityRegistry + ?Sized,
{
    let earmarked = earmarked_elsewhere(store, plan)?;
    let mut holdings = get_holdings(host, native_denom, &plan.owner)?;
    for holding in &mut holdings {
        let taken = earmarked.get(&holding.asset).copied().unwrap_or(0);
        holding.amount = holding.amount.saturating_sub(taken);
    }
    holdings.retain(|h| h.amount > 0);
    Ok(holdings)
}

/// Snapshot the owner's unlocked holdings and earmark them for `plan`.
pub fn lock(ctx: &mut StepContext<'_>, plan: &InheritancePlan) -> Result<LockedPool, InheritanceError> {
    if ctx.store.locked_pool(plan.id)?.is_some() {
        return Err(InheritanceError::Invariant {
            plan_id: plan.id,
            detail: "holdings are already locked".into(),
        });
    }
    let holdings = lockable_holdings(&*ctx.store, &*ctx.host, &ctx.params.native_denom, plan)?;
    let pool = snapshot(plan, holdings, ctx.at);
    ctx.store.put_locked_pool(&pool)?;

    log::info!(
        "[plan {}] locked {} asset(s) of {}",
        plan.id,
        pool.items.len(),
        plan.owner
    );
    Ok(pool)
}

/// The plan's existing lock, or a fresh one.
pub fn lock_or_resume(
    ctx: &mut StepContext<'_>,
    plan: &InheritancePlan,
) -> Result<LockedPool, InheritanceError> {
    match ctx.store.locked_pool(plan.id)? {
        Some(pool) => {
            log::warn!("[plan {}] reusing lock taken at height {}", plan.id, pool.locked_at.height);
            Ok(pool)
        }
        None => lock(ctx, plan),
    }
}

/// Release a plan's lock. Returns the pool if one was held.
pub fn unlock(ctx: &mut StepContext<'_>, plan_id: PlanId) -> Result<Option<LockedPool>, InheritanceError> {
    let pool = ctx.store.remove_locked_pool(plan_id)?;
    if pool.is_some() {
        log::info!("[plan {}] lock released", plan_id);
    }
    Ok(pool)
}

/// What is still transferable for `asset` out of `pool`.
pub fn remaining(pool: &LockedPool, log: &[TransferredAsset], asset: &AssetId) -> Amount {
    pool.locked_amount(asset)
        .saturating_sub(transferred_total(log, asset))
}

/// Move `items` from the plan's owner to `recipient`, each clipped to what
/// remains of the locked pool.
///
/// Store failures abort; item-level failures are recorded in the outcome
/// and emitted as `TransferFailed`.
pub fn transfer(
    ctx: &mut StepContext<'_>,
    plan_id: PlanId,
    recipient: &Address,
    items: Vec<Holding>,
    reference: &str,
) -> Result<TransferOutcome, InheritanceError> {
    let pool = ctx
        .store
        .locked_pool(plan_id)?
        .ok_or_else(|| InheritanceError::Invariant {
            plan_id,
            detail: "transfer requested without a locked pool".into(),
        })?;
    let mut log = ctx.store.transfers(plan_id)?;
    let mut outcome = TransferOutcome::default();

    for item in items {
        if pool.item(&item.asset).is_none() {
            outcome.failures.push(TransferFailure {
                recipient: recipient.clone(),
                asset: item.asset,
                amount: item.amount,
                reason: TransferFailureReason::NotLocked,
            });
            continue;
        }

        let amount = item.amount.min(remaining(&pool, &log, &item.asset));
        if amount == 0 {
            outcome.failures.push(TransferFailure {
                recipient: recipient.clone(),
                asset: item.asset,
                amount: item.amount,
                reason: TransferFailureReason::NothingRemaining,
            });
            continue;
        }

        // The owner may have spent part of a locked asset since.
        let held = match held_by(&*ctx.host, &pool.owner, &item.asset) {
            Ok(held) => held,
            Err(e) => {
                outcome.failures.push(TransferFailure {
                    recipient: recipient.clone(),
                    asset: item.asset,
                    amount,
                    reason: TransferFailureReason::Rejected {
                        message: e.to_string(),
                    },
                });
                continue;
            }
        };
        if held == 0 {
            outcome.failures.push(TransferFailure {
                recipient: recipient.clone(),
                asset: item.asset,
                amount,
                reason: TransferFailureReason::InsufficientFunds { available: 0 },
            });
            continue;
        }
        if held < amount {
            log::warn!(
                "[plan {}] {} holds only {} of {}, moving that instead of {}",
                plan_id,
                pool.owner,
                held,
                item.asset,
                amount
            );
        }
        let amount = amount.min(held);

        match move_item(&mut *ctx.host, &pool.owner, recipient, &item.asset, amount) {
            Ok(()) => {
                let record = TransferredAsset {
                    plan_id,
                    recipient: recipient.clone(),
                    kind: item.asset.kind,
                    identifier: item.asset.identifier.clone(),
                    amount,
                    reference: reference.to_string(),
                    at: ctx.at,
                };
                ctx.store.append_transfer(&record)?;
                log.push(record);
                outcome.moved.push(Holding::new(item.asset, amount));
            }
            Err(e) => {
                let reason = match e {
                    HostError::InsufficientFunds { available, .. } => {
                        TransferFailureReason::InsufficientFunds { available }
                    }
                    other => TransferFailureReason::Rejected {
                        message: other.to_string(),
                    },
                };
                outcome.failures.push(TransferFailure {
                    recipient: recipient.clone(),
                    asset: item.asset,
                    amount,
                    reason,
                });
            }
        }
    }

    for failure in &outcome.failures {
        log::warn!(
            "[plan {}] {} of {} to {} not transferred: {:?}",
            plan_id,
            failure.amount,
            failure.asset,
            failure.recipient,
            failure.reason
        );
        ctx.emit(InheritanceEvent::TransferFailed {
            plan_id,
            recipient: recipient.clone(),
            asset: failure.asset.clone(),
            amount: failure.amount,
            reason: failure.reason.clone(),
        });
    }

    Ok(outcome)
}

/// How much of `asset` `owner` holds right now.
fn held_by<H: Host + ?Sized>(host: &H, owner: &Address, asset: &AssetId) -> Result<Amount, HostError> {
    match asset.kind {
        AssetKind::Native | AssetKind::Custom => host.balance(owner, &asset.identifier),
        AssetKind::Equity => {
            let (company_id, class_id) = asset
                .equity_parts()
                .ok_or_else(|| HostError::UnknownAsset(asset.clone()))?;
            Ok(host
                .holdings_by_owner(owner)?
                .into_iter()
                .find(|h| h.company_id == company_id && h.class_id == class_id)
                .map_or(0, |h| h.shares))
        }
    }
}

fn move_item<H: Host + ?Sized>(
    host: &mut H,
    from: &Address,
    to: &Address,
    asset: &AssetId,
    amount: Amount,
) -> Result<(), HostError> {
    match asset.kind {
        AssetKind::Native | AssetKind::Custom => host.send(from, to, &asset.identifier, amount),
        AssetKind::Equity => {
            let (company_id, class_id) = asset
                .equity_parts()
                .ok_or_else(|| HostError::UnknownAsset(asset.clone()))?;
            host.transfer_shares(from, to, company_id, class_id, amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::{Beneficiary, MemoryHost, PlanStatus, SpecificAsset};

    fn owner() -> Address {
        Address::from("heir1owner")
    }

    fn plan_with_pin(pinned: Amount) -> InheritancePlan {
        InheritancePlan {
            id: 1,
            owner: owner(),
            beneficiaries: vec![Beneficiary {
                address: Address::from("heir1alice"),
                priority: 1,
                allocation_percent: 50,
                specific_assets: vec![SpecificAsset {
                    kind: AssetKind::Native,
                    identifier: "uheir".into(),
                    amount: pinned,
                }],
            }],
            inactivity_period: 1,
            grace_period: 1,
            claim_window_duration: 1,
            status: PlanStatus::Triggered,
            created_at: BlockTime::default(),
            updated_at: BlockTime::default(),
        }
    }

    #[test]
    fn test_get_holdings_classifies_assets() {
        let mut host = MemoryHost::new();
        host.mint(&owner(), "uheir", 1_000);
        host.mint(&owner(), "ausd", 50);
        host.issue_shares(&owner(), "acme", "common", 500);

        let holdings = get_holdings(&host, "uheir", &owner()).unwrap();
        assert_eq!(
            holdings,
            vec![
                Holding::new(AssetId::native("uheir"), 1_000),
                Holding::new(AssetId::equity("acme", "common"), 500),
                Holding::new(AssetId::custom("ausd"), 50),
            ]
        );
    }

    #[test]
    fn test_snapshot_deducts_pinned_from_base() {
        let holdings = vec![
            Holding::new(AssetId::native("uheir"), 1_000),
            Holding::new(AssetId::custom("ausd"), 50),
        ];
        let pool = snapshot(&plan_with_pin(300), holdings, BlockTime::new(5, 500));
        assert_eq!(pool.item(&AssetId::native("uheir")).unwrap().percentage_base, 700);
        assert_eq!(pool.item(&AssetId::custom("ausd")).unwrap().percentage_base, 50);

        // Pinning more than is held leaves no percentage base
        let pool = snapshot(
            &plan_with_pin(5_000),
            vec![Holding::new(AssetId::native("uheir"), 1_000)],
            BlockTime::default(),
        );
        assert_eq!(pool.items[0].percentage_base, 0);
        assert_eq!(pool.items[0].amount, 1_000);
    }

    #[test]
    fn test_remaining_subtracts_log() {
        let pool = snapshot(
            &plan_with_pin(0),
            vec![Holding::new(AssetId::native("uheir"), 100)],
            BlockTime::default(),
        );
        let log = vec![TransferredAsset {
            plan_id: 1,
            recipient: Address::from("heir1alice"),
            kind: AssetKind::Native,
            identifier: "uheir".into(),
            amount: 60,
            reference: "claim:1".into(),
            at: BlockTime::default(),
        }];
        assert_eq!(remaining(&pool, &log, &AssetId::native("uheir")), 40);
        assert_eq!(remaining(&pool, &log, &AssetId::custom("uheir")), 0);
    }
}
