//! Tests for tokio spawner utilities

use std::time::Duration;

use chrono::Utc;
use studio_ledger::core::{
    Booking, BookingStatus, Funding, Notification, NotificationTrigger, OutboxNotifier, Spawn,
};
use studio_ledger::infra::InMemoryOutbox;
use studio_ledger::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn_blocking_runs_off_worker() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn_blocking(move || {
        std::thread::sleep(Duration::from_millis(10));
        tx.send(tokio::runtime::Handle::try_current().is_ok()).unwrap();
    });

    // The blocking pool still carries the runtime context.
    assert!(rx.await.expect("oneshot result"));
}

#[test]
fn test_try_current_outside_runtime() {
    assert!(TokioSpawner::try_current().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_outbox_notifier_delivers_on_spawned_task() {
    let notifier = OutboxNotifier::new(InMemoryOutbox::new(), TokioSpawner::current());
    let outbox = notifier.outbox();

    let booking = Booking {
        id: 1,
        user_id: 42,
        schedule_id: 9,
        status: BookingStatus::Booked,
        funding: Funding::Invitation,
        checked_in_at: None,
        created_at: Utc::now(),
    };
    notifier.trigger(Notification::BookingConfirmed { booking });

    let mut delivered = 0;
    for _ in 0..100 {
        delivered = outbox.lock().len();
        if delivered > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(delivered, 1);
    assert_eq!(outbox.lock().fetch(42, None, 10).len(), 1);
}
