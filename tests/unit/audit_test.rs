//! Tests for audit sink

use studio_ledger::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        AuditAction::Book,
        Some(1),
        Some(2),
        Some(3),
        Some("funding=invitation".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].booking_id, Some(2));
    assert_eq!(events[0].action, AuditAction::Book);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(AuditAction::Book, Some(1), Some(1), Some(1), None));
    sink.record(build_audit_event(AuditAction::Book, Some(1), Some(2), Some(2), None));
    sink.record(build_audit_event(AuditAction::Cancel, Some(1), Some(1), Some(1), None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].booking_id, Some(2)); // First one popped
    assert_eq!(events[1].action, AuditAction::Cancel);
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(AuditAction::Generate, None, None, None, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let a = build_audit_event(AuditAction::CancelSchedule, Some(4), None, None, None);
    let b = build_audit_event(AuditAction::CancelSchedule, Some(4), None, None, None);

    assert_ne!(a.event_id, b.event_id);
    assert_eq!(a.schedule_id, Some(4));
    assert_eq!(a.booking_id, None);
    assert_eq!(
        serde_json::to_value(a.action).unwrap(),
        serde_json::json!("cancel_schedule")
    );
}
