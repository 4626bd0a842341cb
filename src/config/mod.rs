//! Configuration models for storage, outbox, and booking policy.

pub mod ledger;

pub use ledger::{LedgerConfig, OutboxConfig, StorageConfig, MAX_CUTOFF_HOURS, MAX_HORIZON_DAYS};
