//! Storage seam for the generator, the booking ledger, and the cancellation cascade.
//!
//! Every mutating method is a single transaction: it either commits all of its
//! effects or none. Implementations lock the target schedule instance before
//! touching its bookings or any credit counter, so booking and cancellation on
//! the same schedule always acquire locks in the same order. Operations on
//! different schedules never contend on a shared lock.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::model::{
    Booking, CancelOutcome, ClassTemplate, Funding, NewClassTemplate, NewSubscription,
    ScheduleInstance, Subscription, TemplateUpdate, WaitlistEntry,
};
use crate::core::LedgerError;
use crate::util::{BookingId, ScheduleId, SubscriptionId, TemplateId, UserId};

/// Transactional persistence backend.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Insert a new active class template.
    async fn create_template(&self, template: NewClassTemplate)
        -> Result<ClassTemplate, LedgerError>;

    /// Update a template. Instances generated earlier keep their snapshots.
    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<ClassTemplate, LedgerError>;

    /// Fetch a template.
    async fn template(&self, id: TemplateId) -> Result<ClassTemplate, LedgerError>;

    /// Expand active templates into instances for `days` consecutive dates
    /// starting at `start`, skipping `(template, date)` pairs that already exist.
    /// Returns only the instances created by this call.
    async fn generate_schedules(
        &self,
        start: NaiveDate,
        days: u32,
    ) -> Result<Vec<ScheduleInstance>, LedgerError>;

    /// Fetch one schedule instance.
    async fn schedule(&self, id: ScheduleId) -> Result<ScheduleInstance, LedgerError>;

    /// Instances dated within `[from, to]`, ordered by date then start time.
    async fn list_schedules(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>, LedgerError>;

    /// Insert a subscription with `classes_used = 0`.
    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, LedgerError>;

    /// Fetch a subscription.
    async fn subscription(&self, id: SubscriptionId) -> Result<Subscription, LedgerError>;

    /// The member's most recent active subscription covering `on`.
    async fn active_subscription(
        &self,
        user_id: UserId,
        on: NaiveDate,
    ) -> Result<Option<Subscription>, LedgerError>;

    /// Add admin-granted invitation credits; returns the new balance.
    async fn grant_invitations(&self, user_id: UserId, count: u32) -> Result<u32, LedgerError>;

    /// Current invitation credit balance (0 for unknown members).
    async fn invitation_balance(&self, user_id: UserId) -> Result<u32, LedgerError>;

    /// Claim a seat, consuming `funding`.
    ///
    /// Fails with `ScheduleCancelled`, `ScheduleFull`, `InsufficientCredit`, or
    /// `DuplicateBooking` without side effects.
    async fn create_booking(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
    ) -> Result<Booking, LedgerError>;

    /// Release a `booked` claim owned by `user_id`, restore its credit, and
    /// promote the first eligible waitlist entry into the freed seat.
    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<CancelOutcome, LedgerError>;

    /// Move a `booked` claim to `attended`.
    async fn check_in(&self, booking_id: BookingId) -> Result<Booking, LedgerError>;

    /// Fetch one booking.
    async fn booking(&self, id: BookingId) -> Result<Booking, LedgerError>;

    /// Every booking of a schedule instance in creation order.
    async fn list_schedule_bookings(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Booking>, LedgerError>;

    /// Every booking of a member, newest first.
    async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, LedgerError>;

    /// Cancel a schedule instance and every `booked` claim on it, restoring
    /// each claim's credit. Returns the bookings that were cancelled.
    async fn cancel_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, LedgerError>;

    /// Queue a member for a full schedule. Credits are consumed only on promotion.
    async fn join_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
        max_depth: usize,
    ) -> Result<WaitlistEntry, LedgerError>;

    /// Remove a member's pending waitlist entry.
    async fn leave_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, LedgerError>;

    /// Waitlist entries of a schedule, pending and promoted, ordered by position.
    async fn waitlist(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntry>, LedgerError>;
}
