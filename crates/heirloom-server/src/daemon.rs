//! The daemon loop: every step drains the inbox, applies each message,
//! sweeps every plan and journals what happened.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use heirloom_core::{
    Address, BeneficiaryClaim, BlockTime, InheritanceEvent, InheritancePlan, LockedPool, PlanId,
    SwitchTrigger, TransferredAsset,
};
use heirloom_engine::{CheckinUrgency, InheritanceMsg, InheritanceService};
use heirloom_store::{db, journal, SqliteLedger, SqliteStore};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub type Node = InheritanceService<SqliteStore, SqliteLedger>;

/// What one step did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub at: BlockTime,
    pub applied: usize,
    pub rejected: usize,
    pub events: usize,
    pub sweep_errors: usize,
}

/// Everything known about one plan, as printed by `--show-plan`.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub plan: InheritancePlan,
    pub trigger: Option<SwitchTrigger>,
    pub claims: Vec<BeneficiaryClaim>,
    pub locked_pool: Option<LockedPool>,
    pub transfers: Vec<TransferredAsset>,
    pub events: Vec<InheritanceEvent>,
}

/// Current UTC time in whole seconds.
pub fn wall_clock() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// The step after `last`. Time never runs backwards even if the wall
/// clock does.
pub fn next_block_time(last: Option<BlockTime>, wall_time: u64) -> BlockTime {
    match last {
        Some(prev) => BlockTime::new(prev.height + 1, wall_time.max(prev.time)),
        None => BlockTime::new(1, wall_time),
    }
}

/// Open (creating if needed) the node database under `data_dir`.
pub fn open_node(config: &ServerConfig) -> Result<Node> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let path = config.db_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    let ledger = SqliteLedger::open(&path)
        .with_context(|| format!("Failed to open ledger at {}", path.display()))?;

    let node = InheritanceService::new(store, ledger, config.protocol.clone())
        .context("Invalid protocol parameters")?
        .with_heartbeat(config.heartbeat.clone());
    Ok(node)
}

/// Execute a single step at `wall_time`.
pub fn run_step(node: &mut Node, wall_time: u64) -> Result<StepSummary> {
    let last = journal::chain_clock(node.store().conn()).context("Failed to read chain clock")?;
    let at = next_block_time(last, wall_time);
    let mut summary = StepSummary {
        at,
        ..StepSummary::default()
    };

    let queued = journal::pending(node.store().conn()).context("Failed to read inbox")?;
    let mut events = Vec::new();

    for msg in queued {
        let result = serde_json::from_str::<InheritanceMsg>(&msg.body)
            .map_err(|e| format!("malformed message: {}", e))
            .and_then(|parsed| {
                node.deliver(&msg.signer, parsed, at).map_err(|e| {
                    if !e.is_rejection() {
                        log::error!("Message {} failed on a system error: {}", msg.id, e);
                    }
                    e.to_string()
                })
            });

        let error = match result {
            Ok(mut emitted) => {
                summary.applied += 1;
                events.append(&mut emitted);
                None
            }
            Err(reason) => {
                log::warn!("Message {} from {} rejected: {}", msg.id, msg.signer, reason);
                summary.rejected += 1;
                Some(reason)
            }
        };
        journal::mark_applied(node.store().conn(), msg.id, at.height, error.as_deref())
            .with_context(|| format!("Failed to mark message {} applied", msg.id))?;
    }

    let report = node.advance(at);
    for err in &report.errors {
        match err.plan_id {
            Some(plan_id) => log::error!("Sweep [{}] plan {}: {}", err.stage, plan_id, err.message),
            None => log::error!("Sweep [{}]: {}", err.stage, err.message),
        }
    }
    summary.sweep_errors = report.errors.len();
    events.extend(report.events);

    summary.events = journal::append_events(node.store().conn(), at, &events)
        .context("Failed to append events")?;
    journal::set_chain_clock(node.store().conn(), at).context("Failed to persist chain clock")?;

    warn_overdue_owners(node, at.time);

    Ok(summary)
}

fn warn_overdue_owners(node: &Node, now: u64) {
    let statuses = match node.heartbeats(now) {
        Ok(statuses) => statuses,
        Err(e) => {
            log::error!("Heartbeat check failed: {}", e);
            return;
        }
    };

    for status in statuses {
        match status.urgency {
            CheckinUrgency::Warning | CheckinUrgency::Critical => log::warn!(
                "[plan {}] owner {} {:?}: {}s of inactivity left",
                status.plan_id,
                status.owner,
                status.urgency,
                status.remaining_secs
            ),
            CheckinUrgency::None | CheckinUrgency::Expired => {}
        }
    }
}

/// Queue `body` for the next step, signed by `signer`. The body must parse
/// as a message; whether it is accepted is decided when it is applied.
pub fn submit(db_path: &Path, signer: &Address, body: &str) -> Result<i64> {
    let msg: InheritanceMsg =
        serde_json::from_str(body).context("Message is not a valid inheritance message")?;
    let conn = db::open_db(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let id = journal::enqueue(&conn, signer, body, wall_clock()).context("Failed to queue message")?;
    log::info!("Queued {} from {} as message {}", msg.name(), signer, id);
    Ok(id)
}

pub fn plan_report(node: &Node, plan_id: PlanId) -> Result<Option<PlanReport>> {
    let Some(plan) = node.plan(plan_id)? else {
        return Ok(None);
    };
    Ok(Some(PlanReport {
        plan,
        trigger: node.trigger(plan_id)?,
        claims: node.claims(plan_id)?,
        locked_pool: node.locked_pool(plan_id)?,
        transfers: node.transfers(plan_id)?,
        events: journal::events_for_plan(node.store().conn(), plan_id)?,
    }))
}

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("heirloom node starting…");
    log::info!("  Data dir:   {}", config.server.data_dir.display());
    log::info!("  Interval:   {} seconds", config.server.step_interval_secs);
    log::info!("  Fallback:   {}", config.protocol.fallback_recipient);

    let mut node = open_node(&config)?;
    let interval = Duration::from_secs(config.server.step_interval_secs);

    // First step runs immediately
    let mut first = true;
    loop {
        if !first {
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_step(&mut node, wall_clock()) {
            Ok(summary) => log::debug!(
                "Step {} done: {} applied, {} rejected, {} events",
                summary.at.height,
                summary.applied,
                summary.rejected,
                summary.events
            ),
            Err(e) => log::error!("Step failed: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::params::SECONDS_PER_DAY;
    use heirloom_core::{BalanceLedger, InheritanceParams, PlanStatus};
    use heirloom_engine::HeartbeatConfig;
    use tempfile::TempDir;

    const OWNER: &str = "heir1owner";
    const T0: u64 = 1_700_000_000;

    fn config(dir: &TempDir) -> ServerConfig {
        ServerConfig {
            server: crate::config::ServerSection {
                data_dir: dir.path().join("data"),
                ..Default::default()
            },
            protocol: InheritanceParams::with_fallback("heir1charity"),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    fn create_plan_body() -> String {
        format!(
            r#"{{"type":"create_plan","beneficiaries":[
                {{"address":"heir1alice","priority":1,"allocation_percent":100}}],
              "inactivity_period":{},"grace_period":{},"claim_window_duration":{}}}"#,
            180 * SECONDS_PER_DAY,
            30 * SECONDS_PER_DAY,
            7 * SECONDS_PER_DAY
        )
    }

    #[test]
    fn test_next_block_time_never_goes_backwards() {
        assert_eq!(next_block_time(None, 100), BlockTime::new(1, 100));
        let prev = BlockTime::new(7, 500);
        assert_eq!(next_block_time(Some(prev), 400), BlockTime::new(8, 500));
        assert_eq!(next_block_time(Some(prev), 600), BlockTime::new(8, 600));
    }

    #[test]
    fn test_step_applies_queued_messages_in_order() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut node = open_node(&config).unwrap();
        let owner = Address::from(OWNER);
        node.host_mut().mint(&owner, "uheir", 1000).unwrap();

        let created = submit(&config.db_path(), &owner, &create_plan_body()).unwrap();
        let bogus = journal::enqueue(node.store().conn(), &owner, "not json", T0).unwrap();
        let stranger = submit(
            &config.db_path(),
            &Address::from("heir1mallory"),
            r#"{"type":"cancel_plan","plan_id":1}"#,
        )
        .unwrap();

        let summary = run_step(&mut node, T0).unwrap();
        assert_eq!(summary.at, BlockTime::new(1, T0));
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.rejected, 2);

        let conn = node.store().conn();
        assert_eq!(journal::outcome(conn, created).unwrap(), Some(None));
        assert!(journal::outcome(conn, bogus).unwrap().unwrap().is_some());
        assert!(journal::outcome(conn, stranger).unwrap().unwrap().is_some());
        assert!(journal::pending(conn).unwrap().is_empty());
        assert_eq!(journal::chain_clock(conn).unwrap(), Some(BlockTime::new(1, T0)));

        let plan = node.plan(1).unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(node.activity(&owner).unwrap().unwrap().last_activity_time, T0);
    }

    #[test]
    fn test_steps_drive_plan_to_completion_across_restarts() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let owner = Address::from(OWNER);
        let alice = Address::from("heir1alice");

        {
            let mut node = open_node(&config).unwrap();
            node.host_mut().mint(&owner, "uheir", 1000).unwrap();
            submit(&config.db_path(), &owner, &create_plan_body()).unwrap();
            run_step(&mut node, T0).unwrap();
        }

        // Inactivity elapses, then grace.
        let triggered_at = T0 + 180 * SECONDS_PER_DAY + 1;
        {
            let mut node = open_node(&config).unwrap();
            run_step(&mut node, triggered_at).unwrap();
            assert_eq!(node.plan(1).unwrap().unwrap().status, PlanStatus::Triggered);
        }

        let mut node = open_node(&config).unwrap();
        run_step(&mut node, triggered_at + 30 * SECONDS_PER_DAY + 1).unwrap();
        assert_eq!(node.plan(1).unwrap().unwrap().status, PlanStatus::ClaimPhase);

        submit(
            &config.db_path(),
            &alice,
            r#"{"type":"claim_assets","plan_id":1,"beneficiary":"heir1alice"}"#,
        )
        .unwrap();
        let summary = run_step(&mut node, triggered_at + 31 * SECONDS_PER_DAY).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.at.height, 4);

        assert_eq!(node.plan(1).unwrap().unwrap().status, PlanStatus::Completed);
        assert_eq!(node.host().balance(&alice, "uheir").unwrap(), 1000);
        assert_eq!(node.host().balance(&owner, "uheir").unwrap(), 0);

        let report = plan_report(&node, 1).unwrap().unwrap();
        assert_eq!(report.transfers.len(), 1);
        assert!(report.trigger.is_none());
        assert!(matches!(
            report.events.last(),
            Some(InheritanceEvent::PlanCompleted { .. })
        ));
    }

    #[test]
    fn test_submit_rejects_unparseable_body() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        open_node(&config).unwrap();
        assert!(submit(&config.db_path(), &Address::from(OWNER), "{}").is_err());
    }

    #[test]
    fn test_plan_report_for_unknown_plan() {
        let dir = TempDir::new().unwrap();
        let node = open_node(&config(&dir)).unwrap();
        assert!(plan_report(&node, 42).unwrap().is_none());
    }
}
