//! Waitlist joins, ordering, and promotion inside the cancellation.

mod common;

use chrono::Weekday;
use studio_ledger::core::{BookingStatus, Funding, LedgerError, LedgerStore};

use common::{assert_seat_count_consistent, class, fixture, monday, subscription};

#[tokio::test]
async fn waitlist_only_opens_on_a_full_session() {
    let f = fixture(1).await;
    f.store.grant_invitations(1, 1).await.unwrap();
    f.store.grant_invitations(2, 1).await.unwrap();

    assert!(matches!(
        f.ledger.join_waitlist(2, f.schedule_id).await,
        Err(LedgerError::SeatsAvailable(_))
    ));

    f.ledger.book(1, f.schedule_id).await.unwrap();
    let entry = f.ledger.join_waitlist(2, f.schedule_id).await.unwrap();
    assert_eq!(entry.position, 1);
    assert_eq!(entry.funding, Funding::Invitation);
    assert!(entry.is_pending());
    // Joining does not consume credit.
    assert_eq!(f.store.invitation_balance(2).await.unwrap(), 1);

    assert!(matches!(
        f.ledger.join_waitlist(2, f.schedule_id).await,
        Err(LedgerError::AlreadyWaitlisted { user_id: 2, .. })
    ));
    assert!(matches!(
        f.ledger.join_waitlist(1, f.schedule_id).await,
        Err(LedgerError::DuplicateBooking { user_id: 1, .. })
    ));
}

#[tokio::test]
async fn cancellation_promotes_the_first_entry_in_the_same_step() {
    let f = fixture(1).await;
    for user in 1..=3 {
        f.store.grant_invitations(user, 1).await.unwrap();
    }
    let booking = f.ledger.book(1, f.schedule_id).await.unwrap();
    f.ledger.join_waitlist(2, f.schedule_id).await.unwrap();
    f.ledger.join_waitlist(3, f.schedule_id).await.unwrap();

    let outcome = f.ledger.cancel_booking(booking.id, 1).await.unwrap();
    let promoted = outcome.promoted.expect("seat handed to the waitlist");
    assert_eq!(promoted.user_id, 2);
    assert_eq!(promoted.status, BookingStatus::Booked);

    // The seat never became free for a direct booking.
    let schedule = f.ledger.schedule(f.schedule_id).await.unwrap();
    assert_eq!(schedule.booked, 1);
    assert_eq!(f.store.invitation_balance(1).await.unwrap(), 1);
    assert_eq!(f.store.invitation_balance(2).await.unwrap(), 0);
    assert_eq!(f.store.invitation_balance(3).await.unwrap(), 1);

    let queue = f.ledger.waitlist(f.schedule_id).await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].booking_id, Some(promoted.id));
    assert!(queue[1].is_pending());
    assert_seat_count_consistent(&f.store, f.schedule_id).await;
}

#[tokio::test]
async fn entries_that_can_no_longer_pay_are_skipped() {
    let f = fixture(1).await;
    f.store.grant_invitations(1, 1).await.unwrap();
    f.store.grant_invitations(2, 1).await.unwrap();
    let _ = subscription(&f.store, 3, 0).await;

    let booking = f.ledger.book(1, f.schedule_id).await.unwrap();
    f.ledger.join_waitlist(2, f.schedule_id).await.unwrap();
    f.ledger.join_waitlist(3, f.schedule_id).await.unwrap();

    // Member 2 spends the invitation on a Tuesday class before the seat frees up.
    f.store.create_template(class(Weekday::Tue, 9, 5)).await.unwrap();
    let tuesday = f.store.generate_schedules(monday(), 7).await.unwrap()[0].id;
    f.store
        .create_booking(2, tuesday, Funding::Invitation)
        .await
        .unwrap();

    let outcome = f.ledger.cancel_booking(booking.id, 1).await.unwrap();
    assert_eq!(outcome.promoted.map(|b| b.user_id), Some(3));

    let queue = f.ledger.waitlist(f.schedule_id).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].user_id, 3);
}

#[tokio::test]
async fn leaving_and_depth_limits() {
    let f = fixture(1).await;
    f.store.grant_invitations(1, 1).await.unwrap();
    f.ledger.book(1, f.schedule_id).await.unwrap();
    for user in 2..=4 {
        f.store.grant_invitations(user, 1).await.unwrap();
    }

    let ledger = studio_ledger::core::BookingLedger::new(std::sync::Arc::clone(&f.store))
        .with_clock(f.clock.clone())
        .with_max_waitlist_depth(2);
    ledger.join_waitlist(2, f.schedule_id).await.unwrap();
    ledger.join_waitlist(3, f.schedule_id).await.unwrap();
    assert!(matches!(
        ledger.join_waitlist(4, f.schedule_id).await,
        Err(LedgerError::WaitlistFull(_))
    ));

    let left = ledger.leave_waitlist(2, f.schedule_id).await.unwrap();
    assert_eq!(left.user_id, 2);
    match ledger.leave_waitlist(2, f.schedule_id).await {
        Err(LedgerError::NotFound { entity, id }) => {
            assert_eq!(entity, "waitlist entry for schedule");
            assert_eq!(id, f.schedule_id);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }

    let entry = ledger.join_waitlist(4, f.schedule_id).await.unwrap();
    assert_eq!(entry.position, 3, "positions keep increasing after a leave");
}

#[tokio::test]
async fn cascade_discards_pending_entries() {
    let f = fixture(1).await;
    f.store.grant_invitations(1, 1).await.unwrap();
    f.store.grant_invitations(2, 1).await.unwrap();
    f.ledger.book(1, f.schedule_id).await.unwrap();
    f.ledger.join_waitlist(2, f.schedule_id).await.unwrap();

    f.ledger.cancel_schedule(f.schedule_id).await.unwrap();

    assert!(f.ledger.waitlist(f.schedule_id).await.unwrap().is_empty());
    assert_eq!(f.store.invitation_balance(2).await.unwrap(), 1);
    assert!(matches!(
        f.ledger.join_waitlist(2, f.schedule_id).await,
        Err(LedgerError::ScheduleCancelled(_))
    ));
}
