//! Shared fixtures for ledger integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use studio_ledger::core::{BookingLedger, BookingWindow, LedgerStore, NewClassTemplate, NewSubscription};
use studio_ledger::infra::InMemoryStore;
use studio_ledger::util::{FixedClock, ScheduleId, SubscriptionId, UserId};

/// 2026-03-02 is a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

/// Sunday noon before `monday()`: inside the default booking window.
pub fn sunday_noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn class(day: Weekday, hour: u32, capacity: u32) -> NewClassTemplate {
    NewClassTemplate {
        discipline: "crossfit".into(),
        name: format!("WOD {hour:02}:00"),
        day_of_week: day,
        start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
        capacity,
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub ledger: BookingLedger<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub schedule_id: ScheduleId,
}

/// One Monday 07:00 session with `capacity` seats, clock on the Sunday before.
pub async fn fixture(capacity: u32) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store.create_template(class(Weekday::Mon, 7, capacity)).await.unwrap();
    let clock = Arc::new(FixedClock::new(sunday_noon()));
    let ledger = BookingLedger::new(Arc::clone(&store))
        .with_clock(clock.clone())
        .with_booking_window(BookingWindow::default());
    let created = ledger.generate_schedules(monday()).await.unwrap();
    assert_eq!(created.len(), 1);
    Fixture {
        store,
        ledger,
        clock,
        schedule_id: created[0].id,
    }
}

pub async fn subscription(store: &InMemoryStore, user_id: UserId, allowed: u32) -> SubscriptionId {
    store
        .create_subscription(NewSubscription {
            user_id,
            starts_on: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            classes_allowed: allowed,
        })
        .await
        .unwrap()
        .id
}

/// `booked` must equal the number of seat-holding bookings.
pub async fn assert_seat_count_consistent(store: &InMemoryStore, schedule_id: ScheduleId) {
    let schedule = store.schedule(schedule_id).await.unwrap();
    let holding = store
        .list_schedule_bookings(schedule_id)
        .await
        .unwrap()
        .iter()
        .filter(|b| b.status.holds_seat())
        .count();
    assert_eq!(schedule.booked as usize, holding, "seat counter drifted on schedule {schedule_id}");
    assert!(schedule.booked <= schedule.capacity);
}
