//! Borrowed view of everything one state transition touches.

use heirloom_core::{
    AddressValidator, BlockTime, Host, InheritanceError, InheritanceEvent, InheritanceParams,
    InheritancePlan, InheritanceStore, PlanId,
};

/// Store, host and parameters for one transition at one logical time.
///
/// Events emitted while the context is alive are collected in `events`
/// and handed back to the caller when the transition ends.
pub struct StepContext<'a> {
    pub store: &'a mut dyn InheritanceStore,
    pub host: &'a mut dyn Host,
    pub addresses: &'a dyn AddressValidator,
    pub params: &'a InheritanceParams,
    pub at: BlockTime,
    pub events: Vec<InheritanceEvent>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        store: &'a mut dyn InheritanceStore,
        host: &'a mut dyn Host,
        addresses: &'a dyn AddressValidator,
        params: &'a InheritanceParams,
        at: BlockTime,
    ) -> Self {
        Self {
            store,
            host,
            addresses,
            params,
            at,
            events: Vec::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.at.time
    }

    pub fn emit(&mut self, event: InheritanceEvent) {
        log::debug!("[plan {}] event {}", event.plan_id(), event.name());
        self.events.push(event);
    }

    pub fn load_plan(&self, plan_id: PlanId) -> Result<InheritancePlan, InheritanceError> {
        self.store
            .plan(plan_id)?
            .ok_or(InheritanceError::PlanNotFound(plan_id))
    }

    /// Stamp `updated_at` and persist.
    pub fn save_plan(&mut self, plan: &mut InheritancePlan) -> Result<(), InheritanceError> {
        plan.updated_at = self.at;
        self.store.put_plan(plan)?;
        Ok(())
    }

    /// Hand back the collected events.
    pub fn into_events(self) -> Vec<InheritanceEvent> {
        self.events
    }
}
