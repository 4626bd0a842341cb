//! Fire-and-forget member notifications.
//!
//! The ledger emits a [`Notification`] after a transaction commits. Delivery
//! (e-mail, push, ...) is an external concern reached through an [`Outbox`];
//! [`OutboxNotifier`] hands each delivery to the blocking pool of a [`Spawn`]
//! runtime so a slow or failing outbox never delays or undoes a ledger operation.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::model::Booking;
use crate::core::LedgerError;
use crate::util::{ScheduleId, UserId};

/// Member-facing event emitted after a committed ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A booking was created.
    BookingConfirmed {
        /// The new booking.
        booking: Booking,
    },
    /// A member cancelled their booking.
    BookingCancelled {
        /// The cancelled booking.
        booking: Booking,
    },
    /// The studio cancelled a session; one notification per affected booking.
    ClassCancelled {
        /// Cancelled session.
        schedule_id: ScheduleId,
        /// The affected booking, now cancelled.
        booking: Booking,
    },
    /// A waitlisted member was given a freed seat.
    WaitlistPromoted {
        /// Booking created by the promotion.
        booking: Booking,
    },
}

impl Notification {
    /// Member the notification is addressed to.
    #[must_use]
    pub const fn recipient(&self) -> UserId {
        match self {
            Self::BookingConfirmed { booking }
            | Self::BookingCancelled { booking }
            | Self::ClassCancelled { booking, .. }
            | Self::WaitlistPromoted { booking } => booking.user_id,
        }
    }
}

/// Receives notifications; must return immediately.
pub trait NotificationTrigger: Send + Sync {
    /// Hand off a notification for asynchronous delivery.
    fn trigger(&self, notification: Notification);
}

/// Abstraction for outbox backends that persist or deliver notifications.
pub trait Outbox: Send {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Backend failures are reported to the dispatcher, which logs them.
    fn deliver(&mut self, notification: &Notification) -> Result<(), LedgerError>;
}

/// Abstraction for spawning work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Run blocking work, such as file I/O, where it cannot stall async tasks.
    /// Defaults to [`Spawn::spawn`].
    fn spawn_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move { f() });
    }
}

/// Dispatches each notification to an [`Outbox`] on a spawned task.
pub struct OutboxNotifier<O, S> {
    outbox: Arc<Mutex<O>>,
    spawner: S,
}

impl<O, S> OutboxNotifier<O, S> {
    /// Create a notifier delivering into `outbox`.
    pub fn new(outbox: O, spawner: S) -> Self {
        Self {
            outbox: Arc::new(Mutex::new(outbox)),
            spawner,
        }
    }

    /// Shared handle to the outbox, e.g. for draining it in a worker.
    #[must_use]
    pub fn outbox(&self) -> Arc<Mutex<O>> {
        Arc::clone(&self.outbox)
    }
}

impl<O, S> NotificationTrigger for OutboxNotifier<O, S>
where
    O: Outbox + 'static,
    S: Spawn + Send + Sync,
{
    fn trigger(&self, notification: Notification) {
        let outbox = Arc::clone(&self.outbox);
        // Outboxes may block (file appends), so delivery runs on the blocking pool.
        self.spawner.spawn_blocking(move || {
            let recipient = notification.recipient();
            let result = outbox.lock().deliver(&notification);
            match result {
                Ok(()) => tracing::debug!("notification delivered to user {}", recipient),
                Err(e) => tracing::error!("failed to deliver notification to user {}: {}", recipient, e),
            }
        });
    }
}
