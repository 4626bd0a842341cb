//! API-facing request/response models and handlers.
//!
//! Transport is out of scope: an HTTP (or RPC) layer deserializes requests,
//! supplies an [`AuthContext`], calls one of these handlers, and renders the
//! response or [`ApiError::status`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    Booking, BookingLedger, BookingStatus, CancelOutcome, CreditResolver, ErrorKind, Funding,
    FundingKind, LedgerError, LedgerStore, ScheduleInstance, WaitlistEntry,
};
use crate::util::{BookingId, ScheduleId, UserId};

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Member id.
    pub user_id: UserId,
    /// Whether the caller may run studio administration.
    pub is_admin: bool,
}

/// Supplies the authenticated caller of a request.
pub trait AuthContext {
    /// The caller, or `None` for an anonymous request.
    fn caller(&self) -> Option<Caller>;
}

impl AuthContext for Caller {
    fn caller(&self) -> Option<Caller> {
        Some(*self)
    }
}

impl AuthContext for Option<Caller> {
    fn caller(&self) -> Option<Caller> {
        *self
    }
}

/// Error payload with the status an outer transport should answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP-style status code.
    pub status: u16,
    /// Client-facing message.
    pub message: String,
}

impl ApiError {
    /// 401: no authenticated caller.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            status: 401,
            message: "authentication required".into(),
        }
    }

    /// 403: caller lacks the admin role.
    #[must_use]
    pub fn forbidden() -> Self {
        Self {
            status: 403,
            message: "admin role required".into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        };
        let message = if status == 500 {
            tracing::error!("ledger failure: {}", err);
            "internal error".to_string()
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

fn member(auth: &impl AuthContext) -> Result<Caller, ApiError> {
    auth.caller().ok_or_else(ApiError::unauthorized)
}

fn admin(auth: &impl AuthContext) -> Result<Caller, ApiError> {
    let caller = member(auth)?;
    if caller.is_admin {
        Ok(caller)
    } else {
        Err(ApiError::forbidden())
    }
}

/// Booking as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResponse {
    /// Booking id.
    pub booking_id: BookingId,
    /// Member.
    pub user_id: UserId,
    /// Session.
    pub schedule_id: ScheduleId,
    /// Status.
    pub status: BookingStatus,
    /// Credit source.
    pub funding: Funding,
    /// Check-in time.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            user_id: b.user_id,
            schedule_id: b.schedule_id,
            status: b.status,
            funding: b.funding,
            checked_in_at: b.checked_in_at,
            created_at: b.created_at,
        }
    }
}

/// Result of a member cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// The cancelled booking.
    pub booking: BookingResponse,
    /// Credit source given back.
    pub restored: FundingKind,
    /// Member promoted from the waitlist into the freed seat.
    pub promoted_user_id: Option<UserId>,
}

impl From<CancelOutcome> for CancelResponse {
    fn from(o: CancelOutcome) -> Self {
        Self {
            promoted_user_id: o.promoted.as_ref().map(|b| b.user_id),
            booking: o.booking.into(),
            restored: o.restored,
        }
    }
}

/// Session as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleView {
    /// Session id.
    pub schedule_id: ScheduleId,
    /// Date.
    pub date: NaiveDate,
    /// Start time.
    pub start_time: NaiveTime,
    /// Capacity.
    pub capacity: u32,
    /// Seats held.
    pub booked: u32,
    /// Seats open.
    pub available: u32,
    /// Cancelled flag.
    pub cancelled: bool,
}

impl From<ScheduleInstance> for ScheduleView {
    fn from(s: ScheduleInstance) -> Self {
        Self {
            available: s.available(),
            schedule_id: s.id,
            date: s.date,
            start_time: s.start_time,
            capacity: s.capacity,
            booked: s.booked,
            cancelled: s.cancelled,
        }
    }
}

/// Session with its roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceResponse {
    /// The session.
    pub schedule: ScheduleView,
    /// Every booking on it.
    pub bookings: Vec<BookingResponse>,
}

/// Generator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// First day to expand.
    pub start: NaiveDate,
}

/// Generator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Sessions created by this run.
    pub created: Vec<ScheduleView>,
}

/// Whole-session cancellation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelClassResponse {
    /// Session cancelled.
    pub schedule_id: ScheduleId,
    /// Bookings reversed.
    pub cancelled_bookings: Vec<BookingResponse>,
}

/// Health response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Book the caller into a session.
///
/// # Errors
///
/// 401 without a caller, otherwise the mapped ledger error.
pub async fn book_class<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    schedule_id: ScheduleId,
) -> Result<BookingResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = member(auth)?;
    Ok(ledger.book(caller.user_id, schedule_id).await?.into())
}

/// Cancel one of the caller's bookings.
///
/// # Errors
///
/// 401 without a caller; 404 when the booking is not the caller's.
pub async fn cancel_my_booking<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    booking_id: BookingId,
) -> Result<CancelResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = member(auth)?;
    Ok(ledger.cancel_booking(booking_id, caller.user_id).await?.into())
}

/// The caller's booking history, newest first.
///
/// # Errors
///
/// 401 without a caller.
pub async fn my_bookings<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
) -> Result<Vec<BookingResponse>, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = member(auth)?;
    let bookings = ledger.list_user_bookings(caller.user_id).await?;
    Ok(bookings.into_iter().map(Into::into).collect())
}

/// Sessions within a date range.
///
/// # Errors
///
/// 401 without a caller; 422 for an inverted range.
pub async fn list_schedules<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduleView>, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    member(auth)?;
    let schedules = ledger.list_schedules(from, to).await?;
    Ok(schedules.into_iter().map(Into::into).collect())
}

/// Queue the caller on a full session.
///
/// # Errors
///
/// 401 without a caller, otherwise the mapped ledger error.
pub async fn join_waitlist<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    schedule_id: ScheduleId,
) -> Result<WaitlistEntry, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = member(auth)?;
    Ok(ledger.join_waitlist(caller.user_id, schedule_id).await?)
}

/// Remove the caller from a session's waitlist.
///
/// # Errors
///
/// 401 without a caller; 404 when the caller is not queued.
pub async fn leave_waitlist<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    schedule_id: ScheduleId,
) -> Result<WaitlistEntry, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = member(auth)?;
    Ok(ledger.leave_waitlist(caller.user_id, schedule_id).await?)
}

/// Admin: expand templates into the coming days.
///
/// # Errors
///
/// 401/403 for non-admins.
pub async fn generate_week<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    req: GenerateRequest,
) -> Result<GenerateResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    admin(auth)?;
    let created = ledger.generate_schedules(req.start).await?;
    Ok(GenerateResponse {
        created: created.into_iter().map(Into::into).collect(),
    })
}

/// Admin: cancel a whole session.
///
/// # Errors
///
/// 401/403 for non-admins; 404 unknown; 409 already cancelled.
pub async fn cancel_class<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    schedule_id: ScheduleId,
) -> Result<CancelClassResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    let caller = admin(auth)?;
    let cancelled = ledger.cancel_schedule(schedule_id).await?;
    tracing::info!("schedule {} cancelled by admin {}", schedule_id, caller.user_id);
    Ok(CancelClassResponse {
        schedule_id,
        cancelled_bookings: cancelled.into_iter().map(Into::into).collect(),
    })
}

/// Admin: check a member in.
///
/// # Errors
///
/// 401/403 for non-admins; 404 unknown; 409 invalid transition.
pub async fn check_in<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    booking_id: BookingId,
) -> Result<BookingResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    admin(auth)?;
    Ok(ledger.check_in(booking_id).await?.into())
}

/// Admin: a session with its roster.
///
/// # Errors
///
/// 401/403 for non-admins; 404 unknown session.
pub async fn schedule_attendance<S, R>(
    ledger: &BookingLedger<S, R>,
    auth: &impl AuthContext,
    schedule_id: ScheduleId,
) -> Result<AttendanceResponse, ApiError>
where
    S: LedgerStore,
    R: CreditResolver,
{
    admin(auth)?;
    let schedule = ledger.schedule(schedule_id).await?;
    let bookings = ledger.list_schedule_bookings(schedule_id).await?;
    Ok(AttendanceResponse {
        schedule: schedule.into(),
        bookings: bookings.into_iter().map(Into::into).collect(),
    })
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}
