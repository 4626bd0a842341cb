//! Audit trail of committed ledger operations.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::{BookingId, ScheduleId, UserId};

/// Ledger operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Schedule instances generated.
    Generate,
    /// Booking created.
    Book,
    /// Booking cancelled by its owner.
    Cancel,
    /// Waitlist entry promoted into a booking.
    Promote,
    /// Schedule instance cancelled with its bookings.
    CancelSchedule,
    /// Member checked in.
    CheckIn,
    /// Member joined a waitlist.
    JoinWaitlist,
    /// Member left a waitlist.
    LeaveWaitlist,
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Operation performed.
    pub action: AuditAction,
    /// Schedule instance involved, if any.
    pub schedule_id: Option<ScheduleId>,
    /// Booking involved, if any.
    pub booking_id: Option<BookingId>,
    /// Member involved, if any.
    pub user_id: Option<UserId>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);

    /// Events still held by the sink, oldest first. Sinks that forward
    /// events elsewhere keep nothing.
    fn events(&self) -> Vec<AuditEvent> {
        Vec::new()
    }
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Helper to build an audit event stamped with a fresh id and the current time.
#[must_use]
pub fn build_audit_event(
    action: AuditAction,
    schedule_id: Option<ScheduleId>,
    booking_id: Option<BookingId>,
    user_id: Option<UserId>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        action,
        schedule_id,
        booking_id,
        user_id,
        created_at: Utc::now(),
        detail,
    }
}
