//! heirloom store
//!
//! SQLite persistence for a standalone heirloom node:
//!
//! - [`SqliteStore`]: plans, triggers, claims, locks, transfers, activity
//! - [`SqliteLedger`]: balances, share registry and ban list
//! - [`journal`]: the queued-message inbox, the event log and the chain clock
//!
//! Every table lives in one database file opened in WAL mode; the store and
//! the ledger each hold their own connection to it.

pub mod db;
pub mod journal;
pub mod ledger;
pub mod store;

pub use journal::{JournalError, QueuedMsg};
pub use ledger::SqliteLedger;
pub use store::SqliteStore;
