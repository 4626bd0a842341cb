//! Error types for ledger operations.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::core::model::BookingStatus;
use crate::util::{ScheduleId, UserId};

/// Coarse classification of a [`LedgerError`], used by outer layers to pick a
/// response without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or a request outside the allowed booking window.
    Validation,
    /// Unknown schedule, booking, template, subscription, or waitlist entry.
    NotFound,
    /// The request conflicts with current state (full, cancelled, duplicate, no credit).
    Conflict,
    /// Storage or infrastructure failure.
    Internal,
}

/// Errors produced by the generator, the booking ledger, and the cancellation cascade.
///
/// Every failed ledger operation leaves storage untouched: callers never need
/// to compensate for partial effects.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input rejected before touching storage.
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Referenced entity does not exist (or is not visible to the caller).
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"schedule"`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },
    /// The schedule instance has been cancelled.
    #[error("schedule {0} is cancelled")]
    ScheduleCancelled(ScheduleId),
    /// Every seat of the schedule instance is taken.
    #[error("schedule {0} is full")]
    ScheduleFull(ScheduleId),
    /// The chosen credit source cannot fund another class.
    #[error("user {0} has no usable class credit")]
    InsufficientCredit(UserId),
    /// The user already holds an active claim on the schedule.
    #[error("user {user_id} already holds a booking for schedule {schedule_id}")]
    DuplicateBooking {
        /// Member holding the claim.
        user_id: UserId,
        /// Schedule instance claimed.
        schedule_id: ScheduleId,
    },
    /// The booking or schedule was already cancelled.
    #[error("{entity} {id} is already cancelled")]
    AlreadyCancelled {
        /// Entity kind, `"booking"` or `"schedule"`.
        entity: &'static str,
        /// Identifier of the cancelled entity.
        id: i64,
    },
    /// The booking cannot move between the requested statuses.
    #[error("booking cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: BookingStatus,
        /// Requested status.
        to: BookingStatus,
    },
    /// Bookings for the class have not opened yet.
    #[error("bookings for schedule {schedule_id} open at {opens_at}")]
    BookingNotOpen {
        /// Schedule instance requested.
        schedule_id: ScheduleId,
        /// Local time at which bookings open.
        opens_at: NaiveDateTime,
    },
    /// Bookings for the class have closed.
    #[error("bookings for schedule {0} are closed")]
    BookingClosed(ScheduleId),
    /// A waitlist was requested for a schedule that still has free seats.
    #[error("schedule {0} still has seats available")]
    SeatsAvailable(ScheduleId),
    /// The user is already queued on the schedule's waitlist.
    #[error("user {user_id} is already on the waitlist for schedule {schedule_id}")]
    AlreadyWaitlisted {
        /// Queued member.
        user_id: UserId,
        /// Schedule instance.
        schedule_id: ScheduleId,
    },
    /// The waitlist reached its configured depth.
    #[error("waitlist for schedule {0} is full")]
    WaitlistFull(ScheduleId),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    #[must_use]
    pub const fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Classify the error into the ledger's error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid(_) | Self::BookingNotOpen { .. } | Self::BookingClosed(_) => {
                ErrorKind::Validation
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ScheduleCancelled(_)
            | Self::ScheduleFull(_)
            | Self::InsufficientCredit(_)
            | Self::DuplicateBooking { .. }
            | Self::AlreadyCancelled { .. }
            | Self::InvalidTransition { .. }
            | Self::SeatsAvailable(_)
            | Self::AlreadyWaitlisted { .. }
            | Self::WaitlistFull(_) => ErrorKind::Conflict,
            Self::Backend(_) => ErrorKind::Internal,
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
