//! Core ledger abstractions: domain model, storage seam, credit resolution,
//! booking policy, audit, and notifications.

pub mod audit;
pub mod credit;
pub mod error;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod policy;
pub mod store;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use credit::{CreditResolver, FixedFunding, StoreCreditResolver};
pub use error::{AppResult, ErrorKind, LedgerError};
pub use ledger::{BookingLedger, DEFAULT_GENERATION_DAYS, DEFAULT_MAX_WAITLIST_DEPTH};
pub use model::{
    Booking, BookingStatus, CancelOutcome, ClassTemplate, Funding, FundingKind, NewClassTemplate,
    NewSubscription, ScheduleInstance, Subscription, TemplateUpdate, WaitlistEntry,
};
pub use notify::{Notification, NotificationTrigger, Outbox, OutboxNotifier, Spawn};
pub use policy::BookingWindow;
pub use store::LedgerStore;
