//! Identifier aliases shared by every table.
//!
//! All identifiers are 64-bit integers so they map directly onto `BIGSERIAL`
//! columns in the Postgres backend.

/// Class template identifier.
pub type TemplateId = i64;

/// Schedule instance identifier.
pub type ScheduleId = i64;

/// Booking identifier.
pub type BookingId = i64;

/// Member identifier supplied by the auth layer.
pub type UserId = i64;

/// Subscription identifier.
pub type SubscriptionId = i64;

/// Waitlist entry identifier.
pub type WaitlistEntryId = i64;
