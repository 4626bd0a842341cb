//! Benchmarks for the booking ledger.
//!
//! Benchmarks cover:
//! - Schedule generation over a week of templates
//! - Single-member book/cancel round trips
//! - Contended booking of one session by many members
//! - Outbox delivery

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc, Weekday};
use futures::future::join_all;
use tokio::runtime::Runtime;

use studio_ledger::core::{
    Booking, BookingLedger, BookingStatus, BookingWindow, Funding, LedgerStore, NewClassTemplate,
    Notification, Outbox,
};
use studio_ledger::infra::{InMemoryOutbox, InMemoryStore};
use studio_ledger::util::FixedClock;

// ============================================================================
// Fixtures
// ============================================================================

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn template(day: Weekday, hour: u32, capacity: u32) -> NewClassTemplate {
    NewClassTemplate {
        discipline: "crossfit".into(),
        name: format!("WOD {hour:02}:00"),
        day_of_week: day,
        start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
        capacity,
    }
}

async fn ledger_with_session(capacity: u32) -> (Arc<BookingLedger<InMemoryStore>>, i64) {
    let store = Arc::new(InMemoryStore::new());
    store.create_template(template(Weekday::Mon, 7, capacity)).await.unwrap();
    let now = monday().pred_opt().unwrap().and_hms_opt(12, 0, 0).unwrap();
    let ledger = BookingLedger::new(store)
        .with_booking_window(BookingWindow::unrestricted())
        .with_clock(Arc::new(FixedClock::new(now)));
    let id = ledger.generate_schedules(monday()).await.unwrap()[0].id;
    (Arc::new(ledger), id)
}

// ============================================================================
// Generator
// ============================================================================

fn bench_generate_week(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_week");

    for per_day in [1u32, 4, 12] {
        group.throughput(Throughput::Elements(u64::from(per_day) * 7));
        group.bench_with_input(BenchmarkId::from_parameter(per_day), &per_day, |b, &per_day| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let store = InMemoryStore::new();
                for day in WEEKDAYS {
                    for slot in 0..per_day {
                        store.create_template(template(day, 6 + slot, 20)).await.unwrap();
                    }
                }
                black_box(store.generate_schedules(monday(), 7).await.unwrap());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Booking
// ============================================================================

fn bench_book_cancel_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (ledger, schedule_id) = rt.block_on(ledger_with_session(20));
    rt.block_on(ledger.store().grant_invitations(1, 1)).unwrap();

    c.bench_function("book_cancel_round_trip", |b| {
        b.to_async(&rt).iter(|| {
            let ledger = Arc::clone(&ledger);
            async move {
                let booking = ledger.book(1, schedule_id).await.unwrap();
                black_box(ledger.cancel_booking(booking.id, 1).await.unwrap());
            }
        });
    });
}

fn bench_contended_booking(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_booking");

    for members in [10i64, 100, 500] {
        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, &members| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let (ledger, schedule_id) = ledger_with_session(10).await;
                for user in 1..=members {
                    ledger.store().grant_invitations(user, 1).await.unwrap();
                }
                let handles = (1..=members).map(|user| {
                    let ledger = Arc::clone(&ledger);
                    tokio::spawn(async move { ledger.book(user, schedule_id).await })
                });
                black_box(join_all(handles).await);
            });
        });
    }
    group.finish();
}

// ============================================================================
// Outbox
// ============================================================================

fn bench_outbox_deliver(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbox_deliver");

    for size in [100u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut outbox = InMemoryOutbox::new();
                for i in 0..size {
                    let booking = Booking {
                        id: i as i64,
                        user_id: (i % 50) as i64,
                        schedule_id: 1,
                        funding: Funding::Invitation,
                        status: BookingStatus::Booked,
                        checked_in_at: None,
                        created_at: Utc::now(),
                    };
                    outbox
                        .deliver(&Notification::BookingConfirmed { booking })
                        .unwrap();
                }
                black_box(outbox.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_generate_week,
    bench_book_cancel_round_trip,
    bench_contended_booking,
    bench_outbox_deliver
);
criterion_main!(benches);
