//! Owner heartbeat evaluation.
//!
//! Pure logic: no I/O, no store access. Takes a plan and its owner's last
//! activity, returns how close the switch is to firing. The caller (the
//! service, the daemon) decides whether to warn anyone.
//!
//! ```text
//! |--- None ---|--- Warning ---|--- Critical ---|--- Expired
//! 0%          50%             90%             100%
//! ```
//!
//! Expired means the switch is eligible to trigger on the next sweep.
//! Thresholds are configurable.

use heirloom_core::{ActivityRecord, Address, InheritancePlan, PlanId, PlanStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Fraction of the inactivity period elapsed before warning (0.0–1.0).
    pub checkin_threshold: f64,

    /// Fraction elapsed before the warning turns critical (0.0–1.0).
    pub critical_threshold: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            checkin_threshold: 0.5,
            critical_threshold: 0.9,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<(), HeartbeatError> {
        if self.checkin_threshold <= 0.0 || self.checkin_threshold >= 1.0 {
            return Err(HeartbeatError::InvalidThreshold(
                "checkin_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if self.critical_threshold <= self.checkin_threshold || self.critical_threshold >= 1.0 {
            return Err(HeartbeatError::InvalidThreshold(
                "critical_threshold must be between checkin_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// How urgently the owner should act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinUrgency {
    None,
    Warning,
    Critical,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub plan_id: PlanId,
    pub owner: Address,
    pub plan_status: PlanStatus,
    /// `None` when the owner has never been seen.
    pub last_activity_time: Option<u64>,
    pub elapsed_secs: u64,
    /// Seconds until the switch becomes eligible; zero once it is.
    pub remaining_secs: u64,
    /// Fraction of the inactivity period elapsed (0.0–1.0+).
    pub elapsed_fraction: f64,
    pub urgency: CheckinUrgency,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Evaluate one plan's heartbeat at `now`.
///
/// An owner with no activity record counts as silent since genesis, which
/// is always Expired.
pub fn evaluate_heartbeat(
    plan: &InheritancePlan,
    activity: Option<&ActivityRecord>,
    now: u64,
    config: &HeartbeatConfig,
) -> HeartbeatStatus {
    let period = plan.inactivity_period;
    let last_activity_time = activity.map(|a| a.last_activity_time);
    let elapsed_secs = now.saturating_sub(last_activity_time.unwrap_or(0));

    let expired = last_activity_time.is_none() || elapsed_secs >= period;
    let elapsed_fraction = if period == 0 {
        1.0
    } else {
        elapsed_secs as f64 / period as f64
    };

    let urgency = if expired {
        CheckinUrgency::Expired
    } else if elapsed_fraction >= config.critical_threshold {
        CheckinUrgency::Critical
    } else if elapsed_fraction >= config.checkin_threshold {
        CheckinUrgency::Warning
    } else {
        CheckinUrgency::None
    };

    HeartbeatStatus {
        plan_id: plan.id,
        owner: plan.owner.clone(),
        plan_status: plan.status,
        last_activity_time,
        elapsed_secs,
        remaining_secs: if expired { 0 } else { period - elapsed_secs },
        elapsed_fraction,
        urgency,
    }
}

/// Evaluate many plans. Most urgent first; ties broken by elapsed fraction
/// (higher first), then plan id.
pub fn evaluate_batch(
    plans: &[(InheritancePlan, Option<ActivityRecord>)],
    now: u64,
    config: &HeartbeatConfig,
) -> Vec<HeartbeatStatus> {
    let mut statuses: Vec<HeartbeatStatus> = plans
        .iter()
        .map(|(plan, activity)| evaluate_heartbeat(plan, activity.as_ref(), now, config))
        .collect();

    statuses.sort_by(|a, b| {
        b.urgency
            .cmp(&a.urgency)
            .then(
                b.elapsed_fraction
                    .partial_cmp(&a.elapsed_fraction)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.plan_id.cmp(&b.plan_id))
    });
    statuses
}
