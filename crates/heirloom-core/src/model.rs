//! Inheritance plan data model.
//!
//! Everything here is plain data: plans, their beneficiaries, the switch
//! trigger, the cascading claim sequence, activity records, the locked
//! holdings snapshot and the append-only transfer audit log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential plan identifier, assigned by the store starting at 1.
pub type PlanId = u64;

/// Token or share quantity.
pub type Amount = u128;

/// An account address on the host ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Logical clock of one execution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockTime {
    pub height: u64,
    /// Unix seconds.
    pub time: u64,
}

impl BlockTime {
    pub fn new(height: u64, time: u64) -> Self {
        Self { height, time }
    }
}

/// Serde helper: amounts travel as decimal strings so JSON readers
/// without 128-bit integers don't lose precision.
pub mod amount_serde {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which collaborator holds an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// The chain's native denomination, held on the balance ledger.
    Native,
    /// Shares in the equity registry, identified as `company/class`.
    Equity,
    /// Any other balance-ledger denomination.
    Custom,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Equity => write!(f, "equity"),
            AssetKind::Custom => write!(f, "custom"),
        }
    }
}

/// Fully qualified asset: kind plus denom or `company/class`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub kind: AssetKind,
    pub identifier: String,
}

impl AssetId {
    pub fn new(kind: AssetKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn native(denom: impl Into<String>) -> Self {
        Self::new(AssetKind::Native, denom)
    }

    pub fn custom(denom: impl Into<String>) -> Self {
        Self::new(AssetKind::Custom, denom)
    }

    pub fn equity(company_id: &str, class_id: &str) -> Self {
        Self::new(AssetKind::Equity, format!("{}/{}", company_id, class_id))
    }

    /// Split an equity identifier into `(company_id, class_id)`.
    pub fn equity_parts(&self) -> Option<(&str, &str)> {
        if self.kind != AssetKind::Equity {
            return None;
        }
        let (company, class) = self.identifier.split_once('/')?;
        if company.is_empty() || class.is_empty() || class.contains('/') {
            return None;
        }
        Some((company, class))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

/// A quantity of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: AssetId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

impl Holding {
    pub fn new(asset: AssetId, amount: Amount) -> Self {
        Self { asset, amount }
    }
}

/// A fixed amount pinned to one beneficiary ("500 shares of company X").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificAsset {
    pub kind: AssetKind,
    pub identifier: String,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

impl SpecificAsset {
    pub fn asset_id(&self) -> AssetId {
        AssetId::new(self.kind, self.identifier.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub address: Address,
    /// Lower is first in line. Unique within a plan.
    pub priority: u32,
    /// Share of each locked asset's percentage base, 0–100.
    pub allocation_percent: u8,
    #[serde(default)]
    pub specific_assets: Vec<SpecificAsset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Triggered,
    ClaimPhase,
    Completed,
    Cancelled,
}

impl PlanStatus {
    /// Completed and Cancelled plans never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Triggered => "triggered",
            PlanStatus::ClaimPhase => "claim_phase",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritancePlan {
    pub id: PlanId,
    pub owner: Address,
    /// Kept sorted by ascending priority.
    pub beneficiaries: Vec<Beneficiary>,
    /// Seconds of owner silence before the switch may trigger.
    pub inactivity_period: u64,
    /// Seconds the owner has to cancel a trigger.
    pub grace_period: u64,
    /// Seconds each beneficiary has to claim once their window opens.
    pub claim_window_duration: u64,
    pub status: PlanStatus,
    pub created_at: BlockTime,
    pub updated_at: BlockTime,
}

impl InheritancePlan {
    /// Total percentage allocated across all beneficiaries.
    pub fn total_allocation(&self) -> u32 {
        self.beneficiaries
            .iter()
            .map(|b| b.allocation_percent as u32)
            .sum()
    }

    pub fn beneficiary(&self, address: &Address) -> Option<&Beneficiary> {
        self.beneficiaries.iter().find(|b| &b.address == address)
    }

    /// Sum of every beneficiary's pinned amount of `asset`.
    pub fn pinned_total(&self, asset: &AssetId) -> Amount {
        self.beneficiaries
            .iter()
            .flat_map(|b| b.specific_assets.iter())
            .filter(|s| s.kind == asset.kind && s.identifier == asset.identifier)
            .fold(0, |acc, s| acc.saturating_add(s.amount))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Cancelled,
}

/// A fired dead-man switch awaiting grace-period expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchTrigger {
    pub plan_id: PlanId,
    pub triggered_at: BlockTime,
    /// Unix seconds.
    pub grace_period_ends_at: u64,
    pub status: TriggerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Open,
    Claimed,
    Skipped,
    Expired,
}

impl ClaimStatus {
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ClaimStatus::Claimed | ClaimStatus::Skipped | ClaimStatus::Expired
        )
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Open => "open",
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Skipped => "skipped",
            ClaimStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// One beneficiary's turn in the claim cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryClaim {
    pub plan_id: PlanId,
    pub beneficiary: Address,
    pub priority: u32,
    /// Set when the claim is opened.
    pub window_opens_at: Option<u64>,
    pub window_closes_at: Option<u64>,
    pub status: ClaimStatus,
}

impl BeneficiaryClaim {
    pub fn pending(plan_id: PlanId, beneficiary: &Beneficiary) -> Self {
        Self {
            plan_id,
            beneficiary: beneficiary.address.clone(),
            priority: beneficiary.priority,
            window_opens_at: None,
            window_closes_at: None,
            status: ClaimStatus::Pending,
        }
    }

    /// True once an open window's deadline has passed at `now`.
    pub fn window_elapsed(&self, now: u64) -> bool {
        self.status == ClaimStatus::Open && self.window_closes_at.is_some_and(|end| now > end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub address: Address,
    pub last_activity_height: u64,
    pub last_activity_time: u64,
}

/// One locked asset line of a plan's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedItem {
    pub asset: AssetId,
    /// Amount held by the owner at lock time.
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    /// `amount` minus everything pinned by specific allocations.
    #[serde(with = "amount_serde")]
    pub percentage_base: Amount,
}

/// Holdings earmarked for a plan at grace-period expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPool {
    pub plan_id: PlanId,
    pub owner: Address,
    pub locked_at: BlockTime,
    pub items: Vec<LockedItem>,
}

impl LockedPool {
    pub fn item(&self, asset: &AssetId) -> Option<&LockedItem> {
        self.items.iter().find(|i| &i.asset == asset)
    }

    pub fn locked_amount(&self, asset: &AssetId) -> Amount {
        self.item(asset).map(|i| i.amount).unwrap_or(0)
    }
}

/// Append-only audit record of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferredAsset {
    pub plan_id: PlanId,
    pub recipient: Address,
    pub kind: AssetKind,
    pub identifier: String,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    /// `claim:<priority>`, `fallback` or `dormancy`.
    pub reference: String,
    pub at: BlockTime,
}

impl TransferredAsset {
    pub fn asset_id(&self) -> AssetId {
        AssetId::new(self.kind, self.identifier.clone())
    }
}

/// Sum transferred so far for one asset across a plan's audit log.
pub fn transferred_total(records: &[TransferredAsset], asset: &AssetId) -> Amount {
    records
        .iter()
        .filter(|r| r.kind == asset.kind && r.identifier == asset.identifier)
        .fold(0, |acc, r| acc.saturating_add(r.amount))
}
