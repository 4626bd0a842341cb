//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use studio_ledger::builders::{build_notifier, LedgerBuilder};
use studio_ledger::config::{LedgerConfig, OutboxConfig, StorageConfig};
use studio_ledger::core::{
    AuditAction, BookingWindow, LedgerError, LedgerStore, NewClassTemplate, Notification,
};
use studio_ledger::infra::{InMemoryStore, OutboxHandle};
use studio_ledger::runtime::TokioSpawner;
use studio_ledger::util::FixedClock;

fn template() -> NewClassTemplate {
    NewClassTemplate {
        discipline: "yoga".into(),
        name: "Flow".into(),
        day_of_week: Weekday::Mon,
        start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        capacity: 12,
    }
}

#[tokio::test]
async fn test_ledger_builder_applies_config() {
    let cfg = LedgerConfig {
        booking_window: BookingWindow::unrestricted(),
        generation_days: 1,
        ..LedgerConfig::default()
    };
    let store = Arc::new(InMemoryStore::new());
    store.create_template(template()).await.unwrap();

    let now = NaiveDate::from_ymd_opt(2026, 2, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    let ledger = LedgerBuilder::new(cfg)
        .with_clock(Arc::new(FixedClock::new(now)))
        .build_with_store(Arc::clone(&store))
        .unwrap();
    assert_eq!(ledger.booking_window(), BookingWindow::unrestricted());

    // One generated day: Monday 2026-03-02 only.
    let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    assert_eq!(ledger.generate_schedules(monday).await.unwrap().len(), 1);
    assert!(ledger
        .generate_schedules(monday.pred_opt().unwrap())
        .await
        .unwrap()
        .is_empty());

    // Unrestricted window: a month ahead is bookable.
    store.grant_invitations(5, 1).await.unwrap();
    let schedule = store.list_schedules(monday, monday).await.unwrap()[0].id;
    ledger.book(5, schedule).await.unwrap();
}

#[test]
fn test_ledger_builder_rejects_invalid_config() {
    let cfg = LedgerConfig {
        generation_days: 0,
        ..LedgerConfig::default()
    };
    assert!(matches!(
        LedgerBuilder::new(cfg).build_in_memory(),
        Err(LedgerError::Invalid(_))
    ));
}

#[test]
fn test_build_in_memory_requires_in_memory_storage() {
    let cfg = LedgerConfig {
        storage: StorageConfig::Postgres {
            url: "postgres://localhost/studio".into(),
            max_connections: 2,
        },
        ..LedgerConfig::default()
    };
    let builder = LedgerBuilder::new(cfg);
    assert!(matches!(builder.build_in_memory(), Err(LedgerError::Invalid(_))));
}

#[tokio::test]
async fn test_build_notifier_per_outbox_kind() {
    let spawner = TokioSpawner::current();
    assert!(build_notifier(&OutboxConfig::Disabled, spawner.clone())
        .unwrap()
        .is_none());
    assert!(build_notifier(&OutboxConfig::InMemory, spawner.clone())
        .unwrap()
        .is_some());

    let dir = tempfile::tempdir().unwrap();
    let file = OutboxConfig::File {
        path: dir.path().to_string_lossy().into_owned(),
        stream: "builder".into(),
    };
    let (_, handle) = build_notifier(&file, spawner).unwrap().unwrap();
    assert!(matches!(handle, OutboxHandle::File(_)));
    assert!(handle.fetch(1, None, 10).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_built_ledger_exposes_audit_and_outbox() {
    let cfg = LedgerConfig {
        outbox: OutboxConfig::InMemory,
        ..LedgerConfig::default()
    };
    let store = Arc::new(InMemoryStore::new());
    store.create_template(template()).await.unwrap();
    store.grant_invitations(5, 1).await.unwrap();

    let sunday = NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let builder = LedgerBuilder::new(cfg)
        .with_clock(Arc::new(FixedClock::new(sunday)))
        .with_spawner(TokioSpawner::current())
        .unwrap();
    let outbox = builder.outbox().expect("in-memory outbox configured");
    let ledger = builder.build_with_store(Arc::clone(&store)).unwrap();

    let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let schedule_id = ledger.generate_schedules(monday).await.unwrap()[0].id;
    let booking = ledger.book(5, schedule_id).await.unwrap();

    let events = ledger.audit_events();
    assert_eq!(
        events.iter().map(|e| e.action).collect::<Vec<_>>(),
        vec![AuditAction::Generate, AuditAction::Book]
    );
    assert_eq!(events[1].booking_id, Some(booking.id));

    let mut messages = Vec::new();
    for _ in 0..100 {
        messages = outbox.fetch(5, None, 10);
        if !messages.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        &messages[0].notification,
        Notification::BookingConfirmed { booking: b } if b.id == booking.id
    ));

    // The forwarding side drains what it has sent on.
    let OutboxHandle::InMemory(inner) = outbox else {
        panic!("expected the in-memory outbox");
    };
    assert_eq!(inner.lock().drain(5).len(), 1);
    assert!(inner.lock().is_empty());
}

#[test]
fn test_audit_disabled_by_zero_buffer() {
    let cfg = LedgerConfig {
        audit_buffer: 0,
        ..LedgerConfig::default()
    };
    let ledger = LedgerBuilder::new(cfg).build_in_memory().unwrap();
    assert!(ledger.audit_events().is_empty());
}

#[test]
fn test_builder_from_lookup_reports_context() {
    let err = LedgerBuilder::from_lookup(|name| {
        (name == "BOOKING_WINDOW_DAYS").then(|| "4000000000".to_string())
    })
    .err()
    .expect("oversized window is rejected");
    let chain = format!("{err:#}");
    assert!(chain.contains("invalid ledger configuration"));
    assert!(chain.contains("booking window"));

    let builder = LedgerBuilder::from_lookup(|_| None).unwrap();
    assert_eq!(builder.config(), &LedgerConfig::default());
}
