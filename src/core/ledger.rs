//! Booking ledger service.
//!
//! [`BookingLedger`] is the entry point used by outer layers. It applies the
//! booking window, asks the [`CreditResolver`] for funding, delegates the
//! transactional work to a [`LedgerStore`], and after each commit records an
//! audit event and fires member notifications.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::core::audit::{build_audit_event, AuditAction, AuditEvent, AuditSink};
use crate::core::credit::{CreditResolver, StoreCreditResolver};
use crate::core::model::{Booking, CancelOutcome, Funding, ScheduleInstance, WaitlistEntry};
use crate::core::notify::{Notification, NotificationTrigger};
use crate::core::policy::BookingWindow;
use crate::core::{LedgerError, LedgerStore};
use crate::util::{BookingId, Clock, ScheduleId, SystemClock, UserId};

/// Days expanded by one generator run unless configured otherwise.
pub const DEFAULT_GENERATION_DAYS: u32 = 7;

/// Waitlist depth per schedule unless configured otherwise.
pub const DEFAULT_MAX_WAITLIST_DEPTH: usize = 20;

/// Schedule generator, booking ledger, and cancellation cascade behind one API.
pub struct BookingLedger<S, R = StoreCreditResolver<S>> {
    store: Arc<S>,
    resolver: R,
    window: BookingWindow,
    clock: Arc<dyn Clock>,
    generation_days: u32,
    max_waitlist_depth: usize,
    notifier: Option<Arc<dyn NotificationTrigger>>,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
}

impl<S: LedgerStore> BookingLedger<S, StoreCreditResolver<S>> {
    /// Ledger over `store` using the default resolver, booking window, and system clock.
    pub fn new(store: Arc<S>) -> Self {
        let resolver = StoreCreditResolver::new(Arc::clone(&store));
        Self {
            store,
            resolver,
            window: BookingWindow::default(),
            clock: Arc::new(SystemClock),
            generation_days: DEFAULT_GENERATION_DAYS,
            max_waitlist_depth: DEFAULT_MAX_WAITLIST_DEPTH,
            notifier: None,
            audit: None,
        }
    }
}

impl<S, R> BookingLedger<S, R> {
    /// Replace the credit resolver.
    pub fn with_resolver<R2>(self, resolver: R2) -> BookingLedger<S, R2> {
        BookingLedger {
            store: self.store,
            resolver,
            window: self.window,
            clock: self.clock,
            generation_days: self.generation_days,
            max_waitlist_depth: self.max_waitlist_depth,
            notifier: self.notifier,
            audit: self.audit,
        }
    }

    /// Set the booking window.
    #[must_use]
    pub const fn with_booking_window(mut self, window: BookingWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the clock used by the booking window.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of consecutive days a generator run expands.
    #[must_use]
    pub const fn with_generation_days(mut self, days: u32) -> Self {
        self.generation_days = days;
        self
    }

    /// Maximum number of pending waitlist entries per schedule.
    #[must_use]
    pub const fn with_max_waitlist_depth(mut self, depth: usize) -> Self {
        self.max_waitlist_depth = depth;
        self
    }

    /// Attach a notification trigger.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationTrigger>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The configured booking window.
    pub const fn booking_window(&self) -> BookingWindow {
        self.window
    }

    /// Events held by the attached audit sink; empty without one.
    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit
            .as_ref()
            .map(|sink| sink.lock().events())
            .unwrap_or_default()
    }

    fn notify(&self, notification: Notification) {
        if let Some(notifier) = &self.notifier {
            notifier.trigger(notification);
        }
    }

    fn record_audit(
        &self,
        action: AuditAction,
        schedule_id: Option<ScheduleId>,
        booking_id: Option<BookingId>,
        user_id: Option<UserId>,
        detail: Option<String>,
    ) {
        if let Some(audit_sink) = &self.audit {
            let mut sink = audit_sink.lock();
            sink.record(build_audit_event(
                action,
                schedule_id,
                booking_id,
                user_id,
                detail,
            ));
        }
    }
}

impl<S, R> BookingLedger<S, R>
where
    S: LedgerStore,
    R: CreditResolver,
{
    /// Expand active templates into dated instances starting at `start`.
    ///
    /// Idempotent: dates already generated for a template are skipped, so a
    /// failed or repeated run can always be retried.
    ///
    /// # Errors
    ///
    /// Storage failures; nothing is inserted when the run fails.
    pub async fn generate_schedules(
        &self,
        start: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        let created = self
            .store
            .generate_schedules(start, self.generation_days)
            .await?;
        tracing::info!(
            "generated {} schedule instances for {} day(s) from {}",
            created.len(),
            self.generation_days,
            start
        );
        self.record_audit(
            AuditAction::Generate,
            None,
            None,
            None,
            Some(format!("start={start} created={}", created.len())),
        );
        Ok(created)
    }

    /// Book a seat, letting the resolver choose the credit source.
    ///
    /// # Errors
    ///
    /// Booking window violations, `InsufficientCredit` from the resolver, and
    /// everything [`BookingLedger::create_booking`] can return.
    pub async fn book(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<Booking, LedgerError> {
        let schedule = self.open_schedule(schedule_id).await?;
        let funding = self
            .resolver
            .resolve(user_id, schedule.date)
            .await
            .inspect_err(|e| {
                tracing::warn!("no funding for user {} on schedule {}: {}", user_id, schedule_id, e);
            })?;
        self.commit_booking(user_id, schedule_id, funding).await
    }

    /// Book a seat against an explicitly chosen credit source.
    ///
    /// # Errors
    ///
    /// `BookingNotOpen`/`BookingClosed` from the window, then `ScheduleCancelled`,
    /// `ScheduleFull`, `InsufficientCredit`, or `DuplicateBooking` from the
    /// transaction. A failed call has no side effects.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
    ) -> Result<Booking, LedgerError> {
        self.open_schedule(schedule_id).await?;
        self.commit_booking(user_id, schedule_id, funding).await
    }

    async fn open_schedule(&self, schedule_id: ScheduleId) -> Result<ScheduleInstance, LedgerError> {
        let schedule = self.store.schedule(schedule_id).await?;
        self.window.check(&schedule, self.clock.now())?;
        Ok(schedule)
    }

    async fn commit_booking(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
    ) -> Result<Booking, LedgerError> {
        let booking = match self.store.create_booking(user_id, schedule_id, funding).await {
            Ok(booking) => booking,
            Err(e) => {
                tracing::warn!(
                    "booking rejected for user {} on schedule {}: {}",
                    user_id,
                    schedule_id,
                    e
                );
                return Err(e);
            }
        };

        tracing::info!(
            "booking {} created for user {} on schedule {} ({})",
            booking.id,
            user_id,
            schedule_id,
            booking.funding.kind().as_str()
        );
        self.record_audit(
            AuditAction::Book,
            Some(schedule_id),
            Some(booking.id),
            Some(user_id),
            Some(booking.funding.kind().as_str().to_string()),
        );
        self.notify(Notification::BookingConfirmed {
            booking: booking.clone(),
        });
        Ok(booking)
    }

    /// Cancel a member's booking, restoring its credit and promoting the next
    /// waitlisted member into the freed seat.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or foreign bookings, `AlreadyCancelled`, or
    /// `InvalidTransition` for attended/no-show bookings.
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<CancelOutcome, LedgerError> {
        let outcome = self
            .store
            .cancel_booking(booking_id, user_id)
            .await
            .inspect_err(|e| {
                tracing::warn!("cancellation of booking {} by user {} rejected: {}", booking_id, user_id, e);
            })?;

        let schedule_id = outcome.booking.schedule_id;
        tracing::info!(
            "booking {} cancelled, {} credit restored to user {}",
            booking_id,
            outcome.restored.as_str(),
            user_id
        );
        self.record_audit(
            AuditAction::Cancel,
            Some(schedule_id),
            Some(booking_id),
            Some(user_id),
            Some(outcome.restored.as_str().to_string()),
        );
        self.notify(Notification::BookingCancelled {
            booking: outcome.booking.clone(),
        });

        if let Some(promoted) = &outcome.promoted {
            tracing::info!(
                "waitlisted user {} promoted into schedule {} (booking {})",
                promoted.user_id,
                schedule_id,
                promoted.id
            );
            self.record_audit(
                AuditAction::Promote,
                Some(schedule_id),
                Some(promoted.id),
                Some(promoted.user_id),
                None,
            );
            self.notify(Notification::WaitlistPromoted {
                booking: promoted.clone(),
            });
        }
        Ok(outcome)
    }

    /// Cancel a whole session, cascading to every active booking.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AlreadyCancelled`; on any failure no booking is touched.
    pub async fn cancel_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, LedgerError> {
        let cancelled = self
            .store
            .cancel_schedule(schedule_id)
            .await
            .inspect_err(|e| tracing::warn!("cancellation of schedule {} rejected: {}", schedule_id, e))?;

        tracing::info!(
            "schedule {} cancelled, {} booking(s) reversed",
            schedule_id,
            cancelled.len()
        );
        self.record_audit(
            AuditAction::CancelSchedule,
            Some(schedule_id),
            None,
            None,
            Some(format!("bookings={}", cancelled.len())),
        );
        for booking in &cancelled {
            self.notify(Notification::ClassCancelled {
                schedule_id,
                booking: booking.clone(),
            });
        }
        Ok(cancelled)
    }

    /// Mark a member as attended.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidTransition` unless the booking is `booked`.
    pub async fn check_in(&self, booking_id: BookingId) -> Result<Booking, LedgerError> {
        let booking = self.store.check_in(booking_id).await?;
        tracing::info!("user {} checked in (booking {})", booking.user_id, booking.id);
        self.record_audit(
            AuditAction::CheckIn,
            Some(booking.schedule_id),
            Some(booking.id),
            Some(booking.user_id),
            None,
        );
        Ok(booking)
    }

    /// Queue a member for a full session. Funding is resolved now and consumed
    /// only if the member is promoted.
    ///
    /// # Errors
    ///
    /// `SeatsAvailable` while seats remain, `ScheduleCancelled`,
    /// `DuplicateBooking`, `AlreadyWaitlisted`, `WaitlistFull`, or
    /// `InsufficientCredit` from the resolver.
    pub async fn join_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, LedgerError> {
        let schedule = self.store.schedule(schedule_id).await?;
        let funding = self.resolver.resolve(user_id, schedule.date).await?;
        let entry = self
            .store
            .join_waitlist(user_id, schedule_id, funding, self.max_waitlist_depth)
            .await
            .inspect_err(|e| {
                tracing::warn!("user {} could not join waitlist of schedule {}: {}", user_id, schedule_id, e);
            })?;
        tracing::info!(
            "user {} joined waitlist of schedule {} at position {}",
            user_id,
            schedule_id,
            entry.position
        );
        self.record_audit(
            AuditAction::JoinWaitlist,
            Some(schedule_id),
            None,
            Some(user_id),
            Some(format!("position={}", entry.position)),
        );
        Ok(entry)
    }

    /// Remove a member's pending waitlist entry.
    ///
    /// # Errors
    ///
    /// `NotFound` when the member has no pending entry.
    pub async fn leave_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, LedgerError> {
        let entry = self.store.leave_waitlist(user_id, schedule_id).await?;
        tracing::info!("user {} left waitlist of schedule {}", user_id, schedule_id);
        self.record_audit(
            AuditAction::LeaveWaitlist,
            Some(schedule_id),
            None,
            Some(user_id),
            None,
        );
        Ok(entry)
    }

    /// Waitlist of a session ordered by position.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schedule.
    pub async fn waitlist(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntry>, LedgerError> {
        self.store.waitlist(schedule_id).await
    }

    /// Every booking of a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schedule.
    pub async fn list_schedule_bookings(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Booking>, LedgerError> {
        self.store.list_schedule_bookings(schedule_id).await
    }

    /// Every booking of a member, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, LedgerError> {
        self.store.list_user_bookings(user_id).await
    }

    /// One session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schedule.
    pub async fn schedule(&self, schedule_id: ScheduleId) -> Result<ScheduleInstance, LedgerError> {
        self.store.schedule(schedule_id).await
    }

    /// Sessions dated within `[from, to]`.
    ///
    /// # Errors
    ///
    /// `Invalid` when `to` precedes `from`.
    pub async fn list_schedules(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        if to < from {
            return Err(LedgerError::Invalid(format!(
                "range end {to} precedes start {from}"
            )));
        }
        self.store.list_schedules(from, to).await
    }
}
