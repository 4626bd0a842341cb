//! # Studio Ledger
//!
//! Schedule generation and a transactional booking/credit ledger for
//! recurring fitness-studio classes.
//!
//! Weekly class templates are expanded into dated sessions with a fixed
//! capacity. Members claim seats against that capacity while consuming one of
//! two credit sources: a subscription allowance or admin-granted invitation
//! credit. Every booking, cancellation, and whole-session cancellation is a
//! single all-or-nothing transaction across the seat counter, the booking row,
//! and the credit pool.
//!
//! ## Core Problem Solved
//!
//! - **Last-seat races**: concurrent requests for the final seat of a session
//!   produce exactly one booking; everyone else gets `ScheduleFull`.
//! - **Multi-entity atomicity**: a failed booking never consumes credit, and a
//!   cancellation always gives back the exact source that paid for the seat.
//! - **Cascades**: cancelling a session reverses every booking on it at once.
//!
//! ## Key Features
//!
//! - **Idempotent generator**: re-running a week never duplicates sessions.
//! - **Pluggable storage**: [`infra::InMemoryStore`] with per-session row locks,
//!   or `PostgresStore` (feature `postgres`) using `SELECT ... FOR UPDATE`.
//! - **Booking window**: bookings open N days ahead and close N hours before start.
//! - **Waitlists**: a freed seat is handed to the next queued member in the
//!   same transaction as the cancellation.
//! - **Notifications and audit**: fired after commit, never inside a transaction.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use studio_ledger::core::{BookingLedger, LedgerStore, NewClassTemplate};
//! use studio_ledger::infra::InMemoryStore;
//!
//! let store = Arc::new(InMemoryStore::new());
//! store.create_template(template).await?;
//! store.grant_invitations(member, 3).await?;
//!
//! let ledger = BookingLedger::new(Arc::clone(&store));
//! let sessions = ledger.generate_schedules(monday).await?;
//! let booking = ledger.book(member, sessions[0].id).await?;
//! let outcome = ledger.cancel_booking(booking.id, member).await?;
//! ```
//!
//! For complete scenarios, see `tests/ledger_test.rs` and `tests/concurrency_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core ledger abstractions, domain model, and booking service.
pub mod core;
/// Configuration models for storage, outbox, and booking policy.
pub mod config;
/// Builders to construct a ledger from configuration.
pub mod builders;
/// Infrastructure adapters for storage and notification outboxes.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
