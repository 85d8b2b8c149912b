//! The engine running on the SQLite store and ledger, across reopens.

use heirloom_core::params::SECONDS_PER_DAY;
use heirloom_core::{
    Address, BalanceLedger, Beneficiary, BlockTime, ClaimStatus, InheritanceParams, PlanStatus,
};
use heirloom_engine::{InheritanceMsg, InheritanceService, MsgCreatePlan};
use heirloom_store::{journal, SqliteLedger, SqliteStore};
use std::path::Path;
use tempfile::TempDir;

fn day(n: u64) -> u64 {
    n * SECONDS_PER_DAY
}

fn addr(s: &str) -> Address {
    Address::from(s)
}

fn open(path: &Path) -> InheritanceService<SqliteStore, SqliteLedger> {
    InheritanceService::new(
        SqliteStore::open(path).unwrap(),
        SqliteLedger::open(path).unwrap(),
        InheritanceParams::with_fallback("heir1charity"),
    )
    .unwrap()
}

fn heir(address: &str, priority: u32, allocation_percent: u8) -> Beneficiary {
    Beneficiary {
        address: addr(address),
        priority,
        allocation_percent,
        specific_assets: Vec::new(),
    }
}

#[test]
fn plan_survives_restarts_through_completion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("heirloom.db");

    let plan_id = {
        let mut service = open(&path);
        service.host_mut().mint(&addr("heir1owner"), "uheir", 1_000).unwrap();
        let msg = InheritanceMsg::CreatePlan(MsgCreatePlan {
            beneficiaries: vec![heir("heir1alice", 1, 60), heir("heir1bob", 2, 40)],
            inactivity_period: day(180),
            grace_period: day(30),
            claim_window_duration: day(7),
        });
        service
            .deliver(&addr("heir1owner"), msg, BlockTime::new(1, 0))
            .unwrap();
        service.advance(BlockTime::new(2, day(200)));
        service.plans_by_owner(&addr("heir1owner")).unwrap()[0].id
    };

    {
        let mut service = open(&path);
        assert_eq!(
            service.plan(plan_id).unwrap().unwrap().status,
            PlanStatus::Triggered
        );
        let report = service.advance(BlockTime::new(3, day(230)));
        assert!(report.is_clean());
        service
            .claim_assets(&addr("heir1alice"), plan_id, &addr("heir1alice"), BlockTime::new(4, day(231)))
            .unwrap();
    }

    let mut service = open(&path);
    service.advance(BlockTime::new(5, day(239)));
    assert_eq!(
        service.plan(plan_id).unwrap().unwrap().status,
        PlanStatus::Completed
    );
    let claims = service.claims(plan_id).unwrap();
    assert_eq!(claims[0].status, ClaimStatus::Claimed);
    assert_eq!(claims[1].status, ClaimStatus::Expired);

    let host = service.host();
    assert_eq!(host.balance(&addr("heir1alice"), "uheir").unwrap(), 600);
    assert_eq!(host.balance(&addr("heir1charity"), "uheir").unwrap(), 400);
    assert!(service.locked_pool(plan_id).unwrap().is_none());
}

#[test]
fn journal_shares_the_store_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("heirloom.db");
    let store = SqliteStore::open(&path).unwrap();

    let id = journal::enqueue(
        store.conn(),
        &addr("heir1owner"),
        r#"{"type":"cancel_plan","plan_id":9}"#,
        0,
    )
    .unwrap();
    let queued = journal::pending(store.conn()).unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, id);

    let msg: InheritanceMsg = serde_json::from_str(&queued[0].body).unwrap();
    assert_eq!(msg, InheritanceMsg::CancelPlan { plan_id: 9 });
}
