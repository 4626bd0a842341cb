//! Tests for outbox backends

use chrono::{Duration, Utc};
use studio_ledger::core::{Booking, BookingStatus, Funding, Notification, Outbox};
use studio_ledger::infra::{FileOutbox, InMemoryOutbox};

fn booking(id: i64, user_id: i64) -> Booking {
    Booking {
        id,
        user_id,
        schedule_id: 1,
        funding: Funding::Subscription(3),
        status: BookingStatus::Booked,
        checked_in_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn test_in_memory_outbox_is_keyed_by_recipient() {
    let mut outbox = InMemoryOutbox::new();
    assert!(outbox.is_empty());

    outbox
        .deliver(&Notification::BookingConfirmed { booking: booking(1, 10) })
        .unwrap();
    outbox
        .deliver(&Notification::BookingCancelled { booking: booking(1, 10) })
        .unwrap();
    outbox
        .deliver(&Notification::WaitlistPromoted { booking: booking(2, 11) })
        .unwrap();

    assert_eq!(outbox.len(), 3);
    assert_eq!(outbox.fetch(10, None, 10).len(), 2);
    assert_eq!(outbox.fetch(10, None, 1).len(), 1);
    assert_eq!(outbox.fetch(11, None, 10).len(), 1);
    assert!(outbox.fetch(12, None, 10).is_empty());

    let later = Utc::now() + Duration::hours(1);
    assert!(outbox.fetch(10, Some(later), 10).is_empty());
}

#[test]
fn test_file_outbox_replays_after_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut outbox = FileOutbox::new(dir.path(), "studio").unwrap();
        outbox
            .deliver(&Notification::ClassCancelled {
                schedule_id: 1,
                booking: booking(5, 20),
            })
            .unwrap();
        outbox
            .deliver(&Notification::BookingConfirmed { booking: booking(6, 21) })
            .unwrap();
        assert!(outbox.file_path().ends_with("studio_outbox.jsonl"));
    }

    let reopened = FileOutbox::new(dir.path(), "studio").unwrap();
    let messages = reopened.fetch(20, None, 10);
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        messages[0].notification,
        Notification::ClassCancelled { schedule_id: 1, .. }
    ));
    assert_eq!(reopened.fetch(21, None, 10).len(), 1);

    // Streams do not share a file.
    let other = FileOutbox::new(dir.path(), "other").unwrap();
    assert!(other.fetch(20, None, 10).is_empty());
}

#[test]
fn test_file_outbox_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken_outbox.jsonl"), "{not json}\n").unwrap();
    assert!(FileOutbox::new(dir.path(), "broken").is_err());
}
