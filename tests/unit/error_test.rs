//! Tests for error types

use studio_ledger::core::{BookingStatus, ErrorKind, LedgerError};

#[test]
fn test_schedule_full_error() {
    let err = LedgerError::ScheduleFull(7);
    assert_eq!(format!("{}", err), "schedule 7 is full");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_not_found_error() {
    let err = LedgerError::not_found("booking", 12);
    assert_eq!(format!("{}", err), "booking 12 not found");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_invalid_transition_error() {
    let err = LedgerError::InvalidTransition {
        from: BookingStatus::Attended,
        to: BookingStatus::Cancelled,
    };
    assert_eq!(format!("{}", err), "booking cannot move from attended to cancelled");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_window_errors_are_validation() {
    assert_eq!(LedgerError::BookingClosed(3).kind(), ErrorKind::Validation);
    assert_eq!(LedgerError::Invalid("capacity".into()).kind(), ErrorKind::Validation);
}

#[test]
fn test_credit_and_claim_errors_are_conflicts() {
    for err in [
        LedgerError::InsufficientCredit(1),
        LedgerError::DuplicateBooking {
            user_id: 1,
            schedule_id: 2,
        },
        LedgerError::AlreadyCancelled {
            entity: "schedule",
            id: 2,
        },
        LedgerError::ScheduleCancelled(2),
        LedgerError::WaitlistFull(2),
    ] {
        assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
    }
}

#[test]
fn test_backend_error() {
    let err = LedgerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
    assert_eq!(err.kind(), ErrorKind::Internal);
}
