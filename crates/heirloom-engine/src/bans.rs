//! Ban gate: participant-status checks with a defined answer when the
//! registry itself fails.

use heirloom_core::{Address, AddressValidator, BanRegistry, HostError, SkipReason};

/// Outcome of checking a beneficiary before their claim window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
}

pub struct BanGate<'a, R: ?Sized> {
    registry: &'a R,
}

impl<'a, R: BanRegistry + ?Sized> BanGate<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    pub fn is_banned(&self, address: &Address) -> Result<bool, HostError> {
        self.registry.is_banned(address)
    }

    /// Whether an owner's plan may be triggered. A failed lookup defers the
    /// trigger to a later sweep.
    pub fn owner_may_trigger(&self, owner: &Address) -> bool {
        match self.registry.is_banned(owner) {
            Ok(banned) => !banned,
            Err(e) => {
                log::warn!("Ban check for owner {} failed, deferring trigger: {}", owner, e);
                false
            }
        }
    }

    /// Whether a beneficiary should get a claim window. A failed lookup
    /// opens the window anyway; the claim itself re-checks.
    pub fn beneficiary_eligibility(
        &self,
        addresses: &dyn AddressValidator,
        beneficiary: &Address,
    ) -> Eligibility {
        if let Err(reason) = addresses.validate(beneficiary) {
            log::warn!("Beneficiary {} has an invalid address: {}", beneficiary, reason);
            return Eligibility::Skip(SkipReason::InvalidAddress);
        }
        match self.registry.is_banned(beneficiary) {
            Ok(true) => Eligibility::Skip(SkipReason::Banned),
            Ok(false) => Eligibility::Eligible,
            Err(e) => {
                log::warn!(
                    "Ban check for beneficiary {} failed, opening window anyway: {}",
                    beneficiary,
                    e
                );
                Eligibility::Eligible
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::{MemoryHost, PrefixValidator};

    #[test]
    fn test_owner_gate_defers_on_failure() {
        let mut host = MemoryHost::new();
        let owner = Address::from("heir1owner");
        assert!(BanGate::new(&host).owner_may_trigger(&owner));

        host.ban(&owner);
        assert!(!BanGate::new(&host).owner_may_trigger(&owner));

        host.unban(&owner);
        host.set_bans_unavailable(true);
        assert!(!BanGate::new(&host).owner_may_trigger(&owner));
    }

    #[test]
    fn test_beneficiary_eligibility() {
        let mut host = MemoryHost::new();
        let validator = PrefixValidator::new("heir1");
        let alice = Address::from("heir1alice");

        assert_eq!(
            BanGate::new(&host).beneficiary_eligibility(&validator, &alice),
            Eligibility::Eligible
        );
        assert_eq!(
            BanGate::new(&host).beneficiary_eligibility(&validator, &"bad addr".into()),
            Eligibility::Skip(SkipReason::InvalidAddress)
        );

        host.ban(&alice);
        assert_eq!(
            BanGate::new(&host).beneficiary_eligibility(&validator, &alice),
            Eligibility::Skip(SkipReason::Banned)
        );

        host.set_bans_unavailable(true);
        assert_eq!(
            BanGate::new(&host).beneficiary_eligibility(&validator, &alice),
            Eligibility::Eligible
        );
    }
}
