//! Shared fixtures for unit tests: a service over the in-memory store and
//! host with a funded owner.

use crate::msgs::MsgCreatePlan;
use crate::service::InheritanceService;
use heirloom_core::params::SECONDS_PER_DAY;
use heirloom_core::{
    Address, Beneficiary, BlockTime, InheritanceParams, MemoryHost, MemoryStore, PlanId,
};

pub const OWNER: &str = "heir1owner";
pub const FALLBACK: &str = "heir1charity";

/// Native units the owner starts with.
pub const OWNER_FUNDS: u128 = 1_000;

pub type Service = InheritanceService<MemoryStore, MemoryHost>;

pub fn addr(s: &str) -> Address {
    Address::from(s)
}

pub fn day(n: u64) -> u64 {
    n * SECONDS_PER_DAY
}

pub fn service() -> Service {
    let mut host = MemoryHost::new();
    host.mint(&addr(OWNER), "uheir", OWNER_FUNDS);
    InheritanceService::new(
        MemoryStore::new(),
        host,
        InheritanceParams::with_fallback(FALLBACK),
    )
    .unwrap()
}

/// `(address, priority, percent)` triples.
pub fn beneficiaries(entries: &[(&str, u32, u8)]) -> Vec<Beneficiary> {
    entries
        .iter()
        .map(|(address, priority, pct)| Beneficiary {
            address: addr(address),
            priority: *priority,
            allocation_percent: *pct,
            specific_assets: Vec::new(),
        })
        .collect()
}

/// A service holding one plan created at height 1, time 0: 180 days of
/// inactivity, 30 days of grace, 7-day claim windows.
pub fn service_with_plan(entries: &[(&str, u32, u8)]) -> (Service, PlanId) {
    let mut service = service();
    let (plan_id, _) = service
        .create_plan(
            &addr(OWNER),
            MsgCreatePlan {
                beneficiaries: beneficiaries(entries),
                inactivity_period: day(180),
                grace_period: day(30),
                claim_window_duration: day(7),
            },
            BlockTime::new(1, 0),
        )
        .unwrap();
    (service, plan_id)
}
