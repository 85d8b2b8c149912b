//! Protocol-wide parameters.
//!
//! These bound what plan owners may configure. The grace-period floor in
//! particular cannot be lowered by any plan.

use crate::model::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Floor on every plan's grace period (30 days).
pub const MIN_GRACE_PERIOD: u64 = 30 * SECONDS_PER_DAY;

pub const MAX_BENEFICIARIES: usize = 10;

/// Ultra-long inactivity after which holdings go to the fallback recipient
/// regardless of plan state (50 × 365 days).
pub const DORMANCY_PERIOD: u64 = 50 * 365 * SECONDS_PER_DAY;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamsError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("dormancy_period ({dormancy}s) must exceed {field} ({value}s)")]
    DormancyTooShort {
        dormancy: u64,
        field: &'static str,
        value: u64,
    },

    #[error("fallback_recipient {address} is invalid: {reason}")]
    InvalidFallback { address: Address, reason: String },

    #[error("native_denom must not be empty")]
    EmptyDenom,

    #[error("address_prefix must not be empty")]
    EmptyPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceParams {
    #[serde(default = "default_min_grace_period")]
    pub min_grace_period: u64,

    #[serde(default = "default_max_beneficiaries")]
    pub max_beneficiaries: usize,

    #[serde(default = "default_min_inactivity_period")]
    pub min_inactivity_period: u64,

    #[serde(default = "default_min_claim_window")]
    pub min_claim_window: u64,

    #[serde(default = "default_dormancy_period")]
    pub dormancy_period: u64,

    /// Receives everything no beneficiary claims.
    pub fallback_recipient: Address,

    #[serde(default = "default_native_denom")]
    pub native_denom: String,

    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
}

fn default_min_grace_period() -> u64 {
    MIN_GRACE_PERIOD
}

fn default_max_beneficiaries() -> usize {
    MAX_BENEFICIARIES
}

fn default_min_inactivity_period() -> u64 {
    SECONDS_PER_DAY
}

fn default_min_claim_window() -> u64 {
    SECONDS_PER_DAY
}

fn default_dormancy_period() -> u64 {
    DORMANCY_PERIOD
}

fn default_native_denom() -> String {
    "uheir".to_string()
}

fn default_address_prefix() -> String {
    "heir1".to_string()
}

impl InheritanceParams {
    /// Defaults with the given fallback recipient.
    pub fn with_fallback(fallback_recipient: impl Into<Address>) -> Self {
        Self {
            min_grace_period: default_min_grace_period(),
            max_beneficiaries: default_max_beneficiaries(),
            min_inactivity_period: default_min_inactivity_period(),
            min_claim_window: default_min_claim_window(),
            dormancy_period: default_dormancy_period(),
            fallback_recipient: fallback_recipient.into(),
            native_denom: default_native_denom(),
            address_prefix: default_address_prefix(),
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.min_grace_period == 0 {
            return Err(ParamsError::Zero("min_grace_period"));
        }
        if self.max_beneficiaries == 0 {
            return Err(ParamsError::Zero("max_beneficiaries"));
        }
        if self.min_claim_window == 0 {
            return Err(ParamsError::Zero("min_claim_window"));
        }
        if self.native_denom.is_empty() {
            return Err(ParamsError::EmptyDenom);
        }
        if self.address_prefix.is_empty() {
            return Err(ParamsError::EmptyPrefix);
        }
        for (field, value) in [
            ("min_grace_period", self.min_grace_period),
            ("min_inactivity_period", self.min_inactivity_period),
            ("min_claim_window", self.min_claim_window),
        ] {
            if self.dormancy_period <= value {
                return Err(ParamsError::DormancyTooShort {
                    dormancy: self.dormancy_period,
                    field,
                    value,
                });
            }
        }
        crate::host::check_address(&self.address_prefix, &self.fallback_recipient).map_err(
            |reason| ParamsError::InvalidFallback {
                address: self.fallback_recipient.clone(),
                reason,
            },
        )?;
        Ok(())
    }
}
