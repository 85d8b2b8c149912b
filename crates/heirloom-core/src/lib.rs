//! heirloom core
//!
//! Data model, protocol parameters, error taxonomy, events and the
//! capability traits of the dead-man-switch inheritance engine.
//!
//! # Concepts
//!
//! - **Plan**: an owner's ordered list of beneficiaries plus three periods
//!   (inactivity, grace, claim window)
//! - **Switch**: fires once the owner has been inactive for the inactivity
//!   period; any owner activity during the grace period cancels it
//! - **Cascade**: beneficiaries claim one at a time in priority order;
//!   whatever nobody claims goes to the fallback recipient
//!
//! No I/O lives here. Storage and the host chain are reached only through
//! the traits in [`store`] and [`host`].

pub mod error;
pub mod events;
pub mod host;
pub mod memory;
pub mod model;
pub mod params;
pub mod store;

pub use error::{HostError, InheritanceError, StoreError, ValidationError};
pub use events::{InheritanceEvent, SkipReason, TransferFailureReason};
pub use host::{
    AddressValidator, BalanceLedger, BanRegistry, EquityHolding, EquityRegistry, Host,
    PrefixValidator,
};
pub use memory::{MemoryHost, MemoryStore};
pub use model::*;
pub use params::InheritanceParams;
pub use store::{ActivityStore, InheritanceStore, PlanStore};
