//! Tests for utility functions

use chrono::{Duration, NaiveDate};
use studio_ledger::util::{init_tracing, BookingId, Clock, FixedClock, SystemClock};

#[test]
fn test_fixed_clock_is_shared_state() {
    let start = NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let clock = FixedClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::days(1));
    assert_eq!(clock.now().date(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
}

#[test]
fn test_system_clock_moves_forward() {
    let a = SystemClock.now();
    let b = SystemClock.now();
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_booking_id() {
    let id: BookingId = 12345;
    assert_eq!(id, 12345);
}
