//! External collaborators: the balance ledger, the equity registry, the
//! ban registry and address validation.

use crate::error::HostError;
use crate::model::{Address, Amount};

/// Native and custom denominations.
pub trait BalanceLedger {
    fn balance(&self, owner: &Address, denom: &str) -> Result<Amount, HostError>;

    /// Every non-zero denomination `owner` holds, ordered by denom.
    fn balances(&self, owner: &Address) -> Result<Vec<(String, Amount)>, HostError>;

    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), HostError>;
}

/// A share position in the equity registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquityHolding {
    pub company_id: String,
    pub class_id: String,
    pub shares: Amount,
}

pub trait EquityRegistry {
    /// Non-zero positions held by `owner`, ordered by company then class.
    fn holdings_by_owner(&self, owner: &Address) -> Result<Vec<EquityHolding>, HostError>;

    fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        company_id: &str,
        class_id: &str,
        shares: Amount,
    ) -> Result<(), HostError>;
}

/// Sanctions / participant-status registry.
pub trait BanRegistry {
    fn is_banned(&self, address: &Address) -> Result<bool, HostError>;
}

/// Everything the engine needs from the host chain, in one handle.
pub trait Host: BalanceLedger + EquityRegistry + BanRegistry {}

impl<T: BalanceLedger + EquityRegistry + BanRegistry + ?Sized> Host for T {}

/// Format-only address checking.
pub trait AddressValidator {
    fn validate(&self, address: &Address) -> Result<(), String>;
}

/// Accepts `<prefix><lowercase alphanumerics>` addresses.
#[derive(Debug, Clone)]
pub struct PrefixValidator {
    prefix: String,
}

impl PrefixValidator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl AddressValidator for PrefixValidator {
    fn validate(&self, address: &Address) -> Result<(), String> {
        check_address(&self.prefix, address)
    }
}

const MAX_ADDRESS_BODY: usize = 90;

pub(crate) fn check_address(prefix: &str, address: &Address) -> Result<(), String> {
    let body = address
        .as_str()
        .strip_prefix(prefix)
        .ok_or_else(|| format!("expected prefix {}", prefix))?;
    if body.is_empty() {
        return Err("empty address body".into());
    }
    if body.len() > MAX_ADDRESS_BODY {
        return Err(format!("address body longer than {}", MAX_ADDRESS_BODY));
    }
    if !body
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err("address body must be lowercase alphanumeric".into());
    }
    Ok(())
}
