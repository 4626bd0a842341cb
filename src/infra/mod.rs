//! Infrastructure adapters for ledger storage and notification outboxes.

pub mod outbox;
pub mod store;

pub use outbox::{FileOutbox, InMemoryOutbox, OutboxHandle, OutboxMessage};
pub use store::InMemoryStore;
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
