//! In-memory outbox backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{select, OutboxMessage};
use crate::core::{LedgerError, Notification, Outbox};
use crate::util::UserId;

/// Simple in-memory outbox for development/testing, keyed by recipient.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    messages: HashMap<UserId, Vec<OutboxMessage>>,
}

impl InMemoryOutbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a member's messages, optionally since a timestamp.
    #[must_use]
    pub fn fetch(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<OutboxMessage> {
        select(self.messages.get(&user_id), since, limit)
    }

    /// Total number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    /// Whether no message has been delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return a member's messages once they have been sent on.
    pub fn drain(&mut self, user_id: UserId) -> Vec<OutboxMessage> {
        self.messages.remove(&user_id).unwrap_or_default()
    }
}

impl Outbox for InMemoryOutbox {
    fn deliver(&mut self, notification: &Notification) -> Result<(), LedgerError> {
        self.messages
            .entry(notification.recipient())
            .or_default()
            .push(OutboxMessage {
                notification: notification.clone(),
                created_at: Utc::now(),
            });
        Ok(())
    }
}
