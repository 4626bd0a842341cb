//! In-memory ledger store.
//!
//! Each schedule instance lives in its own row behind a `parking_lot` mutex
//! together with its bookings and waitlist, so the row lock plays the part of
//! `SELECT ... FOR UPDATE`. Lock order is always schedule row, then subscription,
//! then invitation counter, then the booking index. Map-level locks are only held
//! long enough to clone an `Arc` and are never held while a row lock is acquired.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};

use crate::core::model::{
    Booking, BookingStatus, CancelOutcome, ClassTemplate, Funding, NewClassTemplate,
    NewSubscription, ScheduleInstance, Subscription, TemplateUpdate, WaitlistEntry,
};
use crate::core::{LedgerError, LedgerStore};
use crate::util::{BookingId, ScheduleId, SubscriptionId, TemplateId, UserId};

struct ScheduleRow {
    instance: ScheduleInstance,
    bookings: Vec<Booking>,
    waitlist: Vec<WaitlistEntry>,
}

impl ScheduleRow {
    fn holds_active_claim(&self, user_id: UserId) -> bool {
        self.bookings
            .iter()
            .any(|b| b.user_id == user_id && b.status.holds_seat())
    }
}

#[derive(Default)]
struct ScheduleTable {
    rows: BTreeMap<ScheduleId, Arc<Mutex<ScheduleRow>>>,
    by_slot: HashMap<(TemplateId, NaiveDate), ScheduleId>,
}

/// A locked-in reference to the counter a funding source draws from.
enum CreditHandle {
    Subscription(Arc<Mutex<Subscription>>),
    Invitation(Arc<AtomicU32>),
}

impl CreditHandle {
    /// Take one class from the source, re-checking ownership and the ceiling.
    fn consume(&self, user_id: UserId) -> Result<(), LedgerError> {
        match self {
            Self::Subscription(sub) => {
                let mut sub = sub.lock();
                if sub.user_id != user_id || !sub.active || !sub.has_remaining() {
                    return Err(LedgerError::InsufficientCredit(user_id));
                }
                sub.classes_used += 1;
                Ok(())
            }
            Self::Invitation(counter) => {
                let mut current = counter.load(Ordering::Acquire);
                loop {
                    if current == 0 {
                        return Err(LedgerError::InsufficientCredit(user_id));
                    }
                    match counter.compare_exchange_weak(
                        current,
                        current - 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Ok(()),
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    /// Give one class back. Subscription usage is floored at zero.
    fn restore(&self) {
        match self {
            Self::Subscription(sub) => {
                let mut sub = sub.lock();
                sub.classes_used = sub.classes_used.saturating_sub(1);
            }
            Self::Invitation(counter) => {
                counter.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}

/// Process-local [`LedgerStore`] for development, tests, and single-node deployments.
pub struct InMemoryStore {
    templates: RwLock<BTreeMap<TemplateId, ClassTemplate>>,
    schedules: RwLock<ScheduleTable>,
    booking_index: RwLock<HashMap<BookingId, ScheduleId>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Mutex<Subscription>>>>,
    invitations: RwLock<HashMap<UserId, Arc<AtomicU32>>>,
    next_template_id: AtomicI64,
    next_schedule_id: AtomicI64,
    next_booking_id: AtomicI64,
    next_subscription_id: AtomicI64,
    next_waitlist_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::AcqRel) + 1
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(BTreeMap::new()),
            schedules: RwLock::new(ScheduleTable::default()),
            booking_index: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            invitations: RwLock::new(HashMap::new()),
            next_template_id: AtomicI64::new(0),
            next_schedule_id: AtomicI64::new(0),
            next_booking_id: AtomicI64::new(0),
            next_subscription_id: AtomicI64::new(0),
            next_waitlist_id: AtomicI64::new(0),
        }
    }

    fn row(&self, schedule_id: ScheduleId) -> Result<Arc<Mutex<ScheduleRow>>, LedgerError> {
        self.schedules
            .read()
            .rows
            .get(&schedule_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("schedule", schedule_id))
    }

    fn row_of_booking(&self, booking_id: BookingId) -> Result<Arc<Mutex<ScheduleRow>>, LedgerError> {
        let schedule_id = self
            .booking_index
            .read()
            .get(&booking_id)
            .copied()
            .ok_or_else(|| LedgerError::not_found("booking", booking_id))?;
        self.row(schedule_id)
    }

    fn all_rows(&self) -> Vec<Arc<Mutex<ScheduleRow>>> {
        self.schedules.read().rows.values().cloned().collect()
    }

    /// Counter to consume from. A missing subscription or invitation counter means no credit.
    fn consumable(&self, user_id: UserId, funding: Funding) -> Result<CreditHandle, LedgerError> {
        match funding {
            Funding::Subscription(id) => self
                .subscriptions
                .read()
                .get(&id)
                .cloned()
                .map(CreditHandle::Subscription)
                .ok_or(LedgerError::InsufficientCredit(user_id)),
            Funding::Invitation => self
                .invitations
                .read()
                .get(&user_id)
                .cloned()
                .map(CreditHandle::Invitation)
                .ok_or(LedgerError::InsufficientCredit(user_id)),
        }
    }

    /// Counter to restore into, created on demand for invitations.
    fn restorable(&self, booking: &Booking) -> Result<CreditHandle, LedgerError> {
        match booking.funding {
            Funding::Subscription(id) => self
                .subscriptions
                .read()
                .get(&id)
                .cloned()
                .map(CreditHandle::Subscription)
                .ok_or_else(|| {
                    LedgerError::Backend(format!(
                        "booking {} references missing subscription {id}",
                        booking.id
                    ))
                }),
            Funding::Invitation => Ok(CreditHandle::Invitation(self.invitation_counter(booking.user_id))),
        }
    }

    fn invitation_counter(&self, user_id: UserId) -> Arc<AtomicU32> {
        if let Some(counter) = self.invitations.read().get(&user_id) {
            return Arc::clone(counter);
        }
        Arc::clone(self.invitations.write().entry(user_id).or_default())
    }

    fn new_booking(&self, user_id: UserId, schedule_id: ScheduleId, funding: Funding) -> Booking {
        Booking {
            id: next_id(&self.next_booking_id),
            user_id,
            schedule_id,
            funding,
            status: BookingStatus::Booked,
            checked_in_at: None,
            created_at: Utc::now(),
        }
    }

    /// Hand the freed seat to the first eligible pending entry. Called with the row locked.
    fn promote_next(&self, row: &mut ScheduleRow) -> Option<Booking> {
        let schedule_id = row.instance.id;
        let mut pending: Vec<(u32, chrono::DateTime<Utc>, i64)> = row
            .waitlist
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| (e.position, e.created_at, e.id))
            .collect();
        pending.sort_unstable();

        for (_, _, entry_id) in pending {
            let Some(idx) = row.waitlist.iter().position(|e| e.id == entry_id) else {
                continue;
            };
            let (user_id, funding) = (row.waitlist[idx].user_id, row.waitlist[idx].funding);

            if row.holds_active_claim(user_id) {
                tracing::warn!(
                    "dropping waitlist entry {} on schedule {}: user {} already booked",
                    entry_id,
                    schedule_id,
                    user_id
                );
                row.waitlist.remove(idx);
                continue;
            }

            let consumed = self
                .consumable(user_id, funding)
                .and_then(|credit| credit.consume(user_id));
            if let Err(e) = consumed {
                tracing::warn!(
                    "dropping waitlist entry {} on schedule {}: {}",
                    entry_id,
                    schedule_id,
                    e
                );
                row.waitlist.remove(idx);
                continue;
            }

            let booking = self.new_booking(user_id, schedule_id, funding);
            let entry = &mut row.waitlist[idx];
            entry.promoted_at = Some(booking.created_at);
            entry.booking_id = Some(booking.id);
            row.instance.booked += 1;
            row.bookings.push(booking.clone());
            self.booking_index.write().insert(booking.id, schedule_id);
            return Some(booking);
        }
        None
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn create_template(
        &self,
        template: NewClassTemplate,
    ) -> Result<ClassTemplate, LedgerError> {
        template.validate()?;
        let created = ClassTemplate {
            id: next_id(&self.next_template_id),
            discipline: template.discipline,
            name: template.name,
            day_of_week: template.day_of_week,
            start_time: template.start_time,
            end_time: template.end_time,
            capacity: template.capacity,
            active: true,
        };
        self.templates.write().insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<ClassTemplate, LedgerError> {
        let mut templates = self.templates.write();
        let template = templates
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("template", id))?;
        update.apply(template)?;
        Ok(template.clone())
    }

    async fn template(&self, id: TemplateId) -> Result<ClassTemplate, LedgerError> {
        self.templates
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("template", id))
    }

    async fn generate_schedules(
        &self,
        start: NaiveDate,
        days: u32,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        let templates: Vec<ClassTemplate> = self
            .templates
            .read()
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect();

        let dates = (0..days)
            .map(|offset| {
                start
                    .checked_add_days(Days::new(u64::from(offset)))
                    .ok_or_else(|| LedgerError::Invalid(format!("date out of range: {start} + {offset}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // The table write lock makes the batch all-or-nothing for readers.
        let mut table = self.schedules.write();
        let mut created = Vec::new();
        for date in dates {
            for template in templates.iter().filter(|t| t.day_of_week == date.weekday()) {
                if table.by_slot.contains_key(&(template.id, date)) {
                    continue;
                }
                let instance = ScheduleInstance {
                    id: next_id(&self.next_schedule_id),
                    template_id: template.id,
                    date,
                    start_time: template.start_time,
                    capacity: template.capacity,
                    booked: 0,
                    cancelled: false,
                    created_at: Utc::now(),
                };
                table.by_slot.insert((template.id, date), instance.id);
                table.rows.insert(
                    instance.id,
                    Arc::new(Mutex::new(ScheduleRow {
                        instance: instance.clone(),
                        bookings: Vec::new(),
                        waitlist: Vec::new(),
                    })),
                );
                created.push(instance);
            }
        }
        Ok(created)
    }

    async fn schedule(&self, id: ScheduleId) -> Result<ScheduleInstance, LedgerError> {
        Ok(self.row(id)?.lock().instance.clone())
    }

    async fn list_schedules(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        let mut instances: Vec<ScheduleInstance> = self
            .all_rows()
            .iter()
            .map(|row| row.lock().instance.clone())
            .filter(|s| from <= s.date && s.date <= to)
            .collect();
        instances.sort_by_key(|s| (s.date, s.start_time, s.id));
        Ok(instances)
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, LedgerError> {
        if subscription.ends_on < subscription.starts_on {
            return Err(LedgerError::Invalid(
                "subscription ends before it starts".into(),
            ));
        }
        let created = Subscription {
            id: next_id(&self.next_subscription_id),
            user_id: subscription.user_id,
            starts_on: subscription.starts_on,
            ends_on: subscription.ends_on,
            classes_used: 0,
            classes_allowed: subscription.classes_allowed,
            active: true,
        };
        self.subscriptions
            .write()
            .insert(created.id, Arc::new(Mutex::new(created.clone())));
        Ok(created)
    }

    async fn subscription(&self, id: SubscriptionId) -> Result<Subscription, LedgerError> {
        let sub = self
            .subscriptions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("subscription", id))?;
        let snapshot = sub.lock().clone();
        Ok(snapshot)
    }

    async fn active_subscription(
        &self,
        user_id: UserId,
        on: NaiveDate,
    ) -> Result<Option<Subscription>, LedgerError> {
        let subs: Vec<Arc<Mutex<Subscription>>> =
            self.subscriptions.read().values().cloned().collect();
        Ok(subs
            .iter()
            .map(|s| s.lock().clone())
            .filter(|s| s.user_id == user_id && s.covers(on))
            .max_by_key(|s| (s.starts_on, s.id)))
    }

    async fn grant_invitations(&self, user_id: UserId, count: u32) -> Result<u32, LedgerError> {
        if count == 0 {
            return Err(LedgerError::Invalid("grant count must be greater than 0".into()));
        }
        let counter = self.invitation_counter(user_id);
        let previous = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_add(count))
            .map_err(|_| LedgerError::Invalid(format!("invitation balance of user {user_id} would overflow")))?;
        Ok(previous + count)
    }

    async fn invitation_balance(&self, user_id: UserId) -> Result<u32, LedgerError> {
        Ok(self
            .invitations
            .read()
            .get(&user_id)
            .map_or(0, |c| c.load(Ordering::Acquire)))
    }

    async fn create_booking(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
    ) -> Result<Booking, LedgerError> {
        let row = self.row(schedule_id)?;
        let mut row = row.lock();
        row.instance.ensure_bookable()?;
        if row.holds_active_claim(user_id) {
            return Err(LedgerError::DuplicateBooking {
                user_id,
                schedule_id,
            });
        }

        self.consumable(user_id, funding)?.consume(user_id)?;

        let booking = self.new_booking(user_id, schedule_id, funding);
        row.instance.booked += 1;
        row.bookings.push(booking.clone());
        self.booking_index.write().insert(booking.id, schedule_id);
        Ok(booking)
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<CancelOutcome, LedgerError> {
        let row = self.row_of_booking(booking_id)?;
        let mut row = row.lock();
        let idx = row
            .bookings
            .iter()
            .position(|b| b.id == booking_id && b.user_id == user_id)
            .ok_or_else(|| LedgerError::not_found("booking", booking_id))?;

        match row.bookings[idx].status {
            BookingStatus::Booked => {}
            BookingStatus::Cancelled => {
                return Err(LedgerError::AlreadyCancelled {
                    entity: "booking",
                    id: booking_id,
                })
            }
            from => {
                return Err(LedgerError::InvalidTransition {
                    from,
                    to: BookingStatus::Cancelled,
                })
            }
        }

        let credit = self.restorable(&row.bookings[idx])?;
        credit.restore();
        row.bookings[idx].status = BookingStatus::Cancelled;
        row.instance.booked = row.instance.booked.saturating_sub(1);
        let booking = row.bookings[idx].clone();

        let promoted = if row.instance.cancelled {
            None
        } else {
            self.promote_next(&mut row)
        };

        Ok(CancelOutcome {
            restored: booking.funding.kind(),
            booking,
            promoted,
        })
    }

    async fn check_in(&self, booking_id: BookingId) -> Result<Booking, LedgerError> {
        let row = self.row_of_booking(booking_id)?;
        let mut row = row.lock();
        let booking = row
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| LedgerError::not_found("booking", booking_id))?;
        if booking.status != BookingStatus::Booked {
            return Err(LedgerError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Attended,
            });
        }
        booking.status = BookingStatus::Attended;
        booking.checked_in_at = Some(Utc::now());
        Ok(booking.clone())
    }

    async fn booking(&self, id: BookingId) -> Result<Booking, LedgerError> {
        let row = self.row_of_booking(id)?;
        let row = row.lock();
        row.bookings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("booking", id))
    }

    async fn list_schedule_bookings(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Booking>, LedgerError> {
        Ok(self.row(schedule_id)?.lock().bookings.clone())
    }

    async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, LedgerError> {
        let mut bookings: Vec<Booking> = self
            .all_rows()
            .iter()
            .flat_map(|row| {
                row.lock()
                    .bookings
                    .iter()
                    .filter(|b| b.user_id == user_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn cancel_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, LedgerError> {
        let row = self.row(schedule_id)?;
        let mut row = row.lock();
        if row.instance.cancelled {
            return Err(LedgerError::AlreadyCancelled {
                entity: "schedule",
                id: schedule_id,
            });
        }

        // Resolve every counter first so a failure leaves the row untouched.
        let credits = row
            .bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Booked)
            .map(|b| self.restorable(b).map(|credit| (b.id, credit)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cancelled = Vec::with_capacity(credits.len());
        for (booking_id, credit) in credits {
            credit.restore();
            if let Some(booking) = row.bookings.iter_mut().find(|b| b.id == booking_id) {
                booking.status = BookingStatus::Cancelled;
                cancelled.push(booking.clone());
            }
        }

        let attended = row
            .bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Attended)
            .count();
        row.instance.booked = u32::try_from(attended).unwrap_or(u32::MAX);
        row.instance.cancelled = true;
        row.waitlist.retain(|e| !e.is_pending());
        Ok(cancelled)
    }

    async fn join_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
        max_depth: usize,
    ) -> Result<WaitlistEntry, LedgerError> {
        let row = self.row(schedule_id)?;
        let mut row = row.lock();
        if row.instance.cancelled {
            return Err(LedgerError::ScheduleCancelled(schedule_id));
        }
        if !row.instance.is_full() {
            return Err(LedgerError::SeatsAvailable(schedule_id));
        }
        if row.holds_active_claim(user_id) {
            return Err(LedgerError::DuplicateBooking {
                user_id,
                schedule_id,
            });
        }
        if row
            .waitlist
            .iter()
            .any(|e| e.user_id == user_id && e.is_pending())
        {
            return Err(LedgerError::AlreadyWaitlisted {
                user_id,
                schedule_id,
            });
        }
        if row.waitlist.iter().filter(|e| e.is_pending()).count() >= max_depth {
            return Err(LedgerError::WaitlistFull(schedule_id));
        }

        let position = row.waitlist.iter().map(|e| e.position).max().unwrap_or(0) + 1;
        let entry = WaitlistEntry {
            id: next_id(&self.next_waitlist_id),
            user_id,
            schedule_id,
            position,
            funding,
            promoted_at: None,
            booking_id: None,
            created_at: Utc::now(),
        };
        row.waitlist.push(entry.clone());
        Ok(entry)
    }

    async fn leave_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, LedgerError> {
        let row = self.row(schedule_id)?;
        let mut row = row.lock();
        let idx = row
            .waitlist
            .iter()
            .position(|e| e.user_id == user_id && e.is_pending())
            .ok_or_else(|| LedgerError::not_found("waitlist entry for schedule", schedule_id))?;
        Ok(row.waitlist.remove(idx))
    }

    async fn waitlist(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntry>, LedgerError> {
        let mut entries = self.row(schedule_id)?.lock().waitlist.clone();
        entries.sort_by_key(|e| (e.position, e.created_at, e.id));
        Ok(entries)
    }
}
