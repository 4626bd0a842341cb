//! Builders that assemble a ready ledger from configuration.

pub mod ledger_builder;

pub use ledger_builder::{build_notifier, LedgerBuilder};
