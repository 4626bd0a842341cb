//! Domain model: templates, dated schedule instances, bookings, and credit sources.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::core::LedgerError;
use crate::util::{BookingId, ScheduleId, SubscriptionId, TemplateId, UserId, WaitlistEntryId};

/// Recurring weekly class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTemplate {
    /// Template identifier.
    pub id: TemplateId,
    /// Discipline the class belongs to (e.g. "crossfit").
    pub discipline: String,
    /// Display name.
    pub name: String,
    /// Weekday on which the class recurs.
    pub day_of_week: Weekday,
    /// Local start time.
    pub start_time: NaiveTime,
    /// Local end time.
    pub end_time: NaiveTime,
    /// Seats offered by newly generated instances.
    pub capacity: u32,
    /// Only active templates are expanded by the generator.
    pub active: bool,
}

/// Input for creating a [`ClassTemplate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClassTemplate {
    /// Discipline name.
    pub discipline: String,
    /// Display name.
    pub name: String,
    /// Weekday on which the class recurs.
    pub day_of_week: Weekday,
    /// Local start time.
    pub start_time: NaiveTime,
    /// Local end time.
    pub end_time: NaiveTime,
    /// Seats per session.
    pub capacity: u32,
}

impl NewClassTemplate {
    /// Reject templates that could never produce a bookable session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] for an empty name, zero capacity, or an
    /// end time that is not after the start time.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::Invalid("template name is required".into()));
        }
        if self.capacity == 0 {
            return Err(LedgerError::Invalid("capacity must be greater than 0".into()));
        }
        if self.end_time <= self.start_time {
            return Err(LedgerError::Invalid(
                "end_time must be after start_time".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update of a template. Already generated instances keep their snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New start time.
    pub start_time: Option<NaiveTime>,
    /// New end time.
    pub end_time: Option<NaiveTime>,
    /// New capacity for future generations.
    pub capacity: Option<u32>,
    /// Enable or disable generation.
    pub active: Option<bool>,
}

impl TemplateUpdate {
    /// Apply the update to a template, validating the result.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] if the updated template would be unusable.
    pub fn apply(&self, template: &mut ClassTemplate) -> Result<(), LedgerError> {
        let mut next = template.clone();
        if let Some(name) = &self.name {
            next.name.clone_from(name);
        }
        if let Some(start) = self.start_time {
            next.start_time = start;
        }
        if let Some(end) = self.end_time {
            next.end_time = end;
        }
        if let Some(capacity) = self.capacity {
            next.capacity = capacity;
        }
        if let Some(active) = self.active {
            next.active = active;
        }
        NewClassTemplate {
            discipline: next.discipline.clone(),
            name: next.name.clone(),
            day_of_week: next.day_of_week,
            start_time: next.start_time,
            end_time: next.end_time,
            capacity: next.capacity,
        }
        .validate()?;
        *template = next;
        Ok(())
    }
}

/// One dated occurrence of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInstance {
    /// Instance identifier.
    pub id: ScheduleId,
    /// Template the instance was generated from.
    pub template_id: TemplateId,
    /// Calendar date of the session.
    pub date: NaiveDate,
    /// Start time snapshot taken at generation.
    pub start_time: NaiveTime,
    /// Capacity snapshot taken at generation.
    pub capacity: u32,
    /// Seats held by bookings in `booked` or `attended` status.
    pub booked: u32,
    /// Terminal cancellation flag.
    pub cancelled: bool,
    /// Generation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ScheduleInstance {
    /// Seats still open.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }

    /// Whether every seat is held.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.booked >= self.capacity
    }

    /// Local start of the session.
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Check that another seat may be claimed.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ScheduleCancelled`] or [`LedgerError::ScheduleFull`].
    pub fn ensure_bookable(&self) -> Result<(), LedgerError> {
        if self.cancelled {
            return Err(LedgerError::ScheduleCancelled(self.id));
        }
        if self.is_full() {
            return Err(LedgerError::ScheduleFull(self.id));
        }
        Ok(())
    }
}

/// Lifecycle of a booking. `Attended`, `Cancelled`, and `NoShow` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Seat claimed.
    Booked,
    /// Member checked in.
    Attended,
    /// Claim released and credit restored.
    Cancelled,
    /// Member never showed up.
    NoShow,
}

impl BookingStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Attended => "attended",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "booked" => Ok(Self::Booked),
            "attended" => Ok(Self::Attended),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            other => Err(LedgerError::Backend(format!(
                "unknown booking status: {other}"
            ))),
        }
    }

    /// Statuses that hold a seat and count toward `ScheduleInstance::booked`.
    #[must_use]
    pub const fn holds_seat(&self) -> bool {
        matches!(self, Self::Booked | Self::Attended)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The credit source backing a booking. Exactly one per booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "subscription_id")]
pub enum Funding {
    /// One class from the subscription's allowance.
    Subscription(SubscriptionId),
    /// One admin-granted invitation credit from the member's counter.
    Invitation,
}

impl Funding {
    /// Kind of the credit source, without the subscription reference.
    #[must_use]
    pub const fn kind(&self) -> FundingKind {
        match self {
            Self::Subscription(_) => FundingKind::Subscription,
            Self::Invitation => FundingKind::Invitation,
        }
    }

    /// Subscription reference, if subscription-funded.
    #[must_use]
    pub const fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            Self::Subscription(id) => Some(*id),
            Self::Invitation => None,
        }
    }

    /// Rebuild from the storage columns `(funding, subscription_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] when the columns disagree.
    pub fn from_columns(kind: &str, subscription_id: Option<SubscriptionId>) -> Result<Self, LedgerError> {
        match (FundingKind::parse(kind)?, subscription_id) {
            (FundingKind::Subscription, Some(id)) => Ok(Self::Subscription(id)),
            (FundingKind::Invitation, None) => Ok(Self::Invitation),
            (kind, sub) => Err(LedgerError::Backend(format!(
                "inconsistent funding columns: {} / {sub:?}",
                kind.as_str()
            ))),
        }
    }
}

/// Funding kind reported when a booking is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingKind {
    /// Subscription allowance.
    Subscription,
    /// Invitation credit.
    Invitation,
}

impl FundingKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Invitation => "invitation",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] for an unknown kind.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "subscription" => Ok(Self::Subscription),
            "invitation" => Ok(Self::Invitation),
            other => Err(LedgerError::Backend(format!("unknown funding kind: {other}"))),
        }
    }
}

/// A member's claim on a schedule instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// Member holding the claim.
    pub user_id: UserId,
    /// Claimed schedule instance.
    pub schedule_id: ScheduleId,
    /// Credit source consumed at creation; reversal restores the same source.
    pub funding: Funding,
    /// Current status.
    pub status: BookingStatus,
    /// Set when the member checks in.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Subscription credit pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Owning member.
    pub user_id: UserId,
    /// First day covered.
    pub starts_on: NaiveDate,
    /// Last day covered.
    pub ends_on: NaiveDate,
    /// Classes consumed so far.
    pub classes_used: u32,
    /// Allowance; 0 means unlimited.
    pub classes_allowed: u32,
    /// Deactivated subscriptions fund nothing.
    pub active: bool,
}

impl Subscription {
    /// Whether the plan has no class ceiling.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.classes_allowed == 0
    }

    /// Whether one more class fits in the allowance.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.is_unlimited() || self.classes_used < self.classes_allowed
    }

    /// Whether the subscription is active and its window contains `date`.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.active && self.starts_on <= date && date <= self.ends_on
    }
}

/// Input for creating a [`Subscription`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    /// Owning member.
    pub user_id: UserId,
    /// First day covered.
    pub starts_on: NaiveDate,
    /// Last day covered.
    pub ends_on: NaiveDate,
    /// Allowance; 0 means unlimited.
    pub classes_allowed: u32,
}

/// A queued request for a seat on a full schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry identifier.
    pub id: WaitlistEntryId,
    /// Queued member.
    pub user_id: UserId,
    /// Schedule instance.
    pub schedule_id: ScheduleId,
    /// Join-order position; lower is served first.
    pub position: u32,
    /// Credit source resolved at join time and consumed on promotion.
    pub funding: Funding,
    /// Set when the entry was turned into a booking.
    pub promoted_at: Option<DateTime<Utc>>,
    /// Booking created by the promotion.
    pub booking_id: Option<BookingId>,
    /// Join timestamp.
    pub created_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Whether the entry is still waiting for a seat.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.promoted_at.is_none()
    }
}

/// Result of a successful booking cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    /// The booking, now `cancelled`.
    pub booking: Booking,
    /// Credit source that was restored.
    pub restored: FundingKind,
    /// Booking created for the first eligible waitlist entry, if any.
    pub promoted: Option<Booking>,
}
