//! heirloom engine
//!
//! The state machine of the dead-man switch: activity tracking, trigger and
//! grace period, the claim cascade, asset locking and transfer, and the
//! end-of-step sweep. Everything runs against the capability traits of
//! `heirloom-core`; nothing here knows how state is stored.
//!
//! # Flow
//!
//! ```text
//! CreatePlan ─► Active ─(owner silent)─► Triggered ─(grace over)─► ClaimPhase
//!                 ▲                          │                          │
//!                 └──────(owner acts)────────┘          claims cascade, then
//!                                                       fallback ─► Completed
//! ```
//!
//! Hosts deliver messages through [`InheritanceService`] and call
//! [`InheritanceService::advance`] once per step.

pub mod activity;
pub mod assets;
pub mod bans;
pub mod claims;
pub mod context;
pub mod heartbeat;
pub mod msgs;
pub mod scheduler;
pub mod service;
pub mod switch;

#[cfg(test)]
pub mod test_utils;

pub use activity::ActivityObserver;
pub use assets::{TransferFailure, TransferOutcome};
pub use claims::ClaimOutcome;
pub use context::StepContext;
pub use heartbeat::{CheckinUrgency, HeartbeatConfig, HeartbeatError, HeartbeatStatus};
pub use msgs::{InheritanceMsg, MsgCreatePlan, MsgUpdatePlan};
pub use scheduler::{SweepError, SweepReport, SweepStage};
pub use service::InheritanceService;
