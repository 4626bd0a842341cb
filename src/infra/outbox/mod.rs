//! Notification outbox backends.

pub mod file;
pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::Notification;
use crate::util::UserId;

pub use file::FileOutbox;
pub use memory::InMemoryOutbox;

/// Outbox message container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// The notification.
    pub notification: Notification,
    /// When the outbox accepted it.
    pub created_at: DateTime<Utc>,
}

/// Shared handle to the outbox a notifier delivers into, for the process
/// that forwards messages to members.
#[derive(Clone)]
pub enum OutboxHandle {
    /// In-memory outbox.
    InMemory(Arc<Mutex<InMemoryOutbox>>),
    /// JSON-lines file outbox.
    File(Arc<Mutex<FileOutbox>>),
}

impl OutboxHandle {
    /// Fetch a member's messages, optionally since a timestamp.
    #[must_use]
    pub fn fetch(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<OutboxMessage> {
        match self {
            Self::InMemory(outbox) => outbox.lock().fetch(user_id, since, limit),
            Self::File(outbox) => outbox.lock().fetch(user_id, since, limit),
        }
    }
}

fn select(
    messages: Option<&Vec<OutboxMessage>>,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<OutboxMessage> {
    messages
        .map(|msgs| {
            msgs.iter()
                .filter(|m| since.is_none_or(|s| m.created_at >= s))
                .take(limit)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
