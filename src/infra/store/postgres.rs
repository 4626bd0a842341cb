//! Postgres-backed ledger store.
//!
//! Every mutating operation runs in one transaction that first takes the
//! schedule instance row with `SELECT ... FOR UPDATE`. Credit counters are
//! consumed with conditional `UPDATE`s so the floor and ceiling are re-checked
//! atomically; a zero row count means the source cannot fund the class.

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};

use crate::core::model::{
    Booking, BookingStatus, CancelOutcome, ClassTemplate, Funding, NewClassTemplate,
    NewSubscription, ScheduleInstance, Subscription, TemplateUpdate, WaitlistEntry,
};
use crate::core::{LedgerError, LedgerStore};
use crate::util::{BookingId, ScheduleId, SubscriptionId, TemplateId, UserId};

const TEMPLATE_COLUMNS: &str =
    "id, discipline, name, day_of_week, start_time, end_time, capacity, active";
const SCHEDULE_COLUMNS: &str =
    "id, template_id, date, start_time, capacity, booked, cancelled, created_at";
const BOOKING_COLUMNS: &str =
    "id, user_id, schedule_id, funding, subscription_id, status, checked_in_at, created_at";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, starts_on, ends_on, classes_used, classes_allowed, active";
const WAITLIST_COLUMNS: &str =
    "id, user_id, schedule_id, position, funding, subscription_id, promoted_at, booking_id, created_at";

/// [`LedgerStore`] over a Postgres connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |e| LedgerError::Backend(format!("{context}: {e}"))
}

fn to_u32(value: i32, column: &str) -> Result<u32, LedgerError> {
    u32::try_from(value).map_err(|_| LedgerError::Backend(format!("negative {column}: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32, LedgerError> {
    i32::try_from(value).map_err(|_| LedgerError::Invalid(format!("{column} exceeds i32::MAX: {value}")))
}

/// Stored as 0 = Sunday ... 6 = Saturday.
fn weekday_to_db(day: Weekday) -> i16 {
    // num_days_from_sunday is always below 7.
    i16::try_from(day.num_days_from_sunday()).unwrap_or_default()
}

fn weekday_from_db(value: i16) -> Result<Weekday, LedgerError> {
    match value {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(LedgerError::Backend(format!("invalid day_of_week: {other}"))),
    }
}

fn decode(e: sqlx::Error) -> LedgerError {
    LedgerError::Backend(format!("failed to decode row: {e}"))
}

fn template_from_row(row: &PgRow) -> Result<ClassTemplate, LedgerError> {
    Ok(ClassTemplate {
        id: row.try_get("id").map_err(decode)?,
        discipline: row.try_get("discipline").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        day_of_week: weekday_from_db(row.try_get("day_of_week").map_err(decode)?)?,
        start_time: row.try_get("start_time").map_err(decode)?,
        end_time: row.try_get("end_time").map_err(decode)?,
        capacity: to_u32(row.try_get("capacity").map_err(decode)?, "capacity")?,
        active: row.try_get("active").map_err(decode)?,
    })
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduleInstance, LedgerError> {
    Ok(ScheduleInstance {
        id: row.try_get("id").map_err(decode)?,
        template_id: row.try_get("template_id").map_err(decode)?,
        date: row.try_get("date").map_err(decode)?,
        start_time: row.try_get("start_time").map_err(decode)?,
        capacity: to_u32(row.try_get("capacity").map_err(decode)?, "capacity")?,
        booked: to_u32(row.try_get("booked").map_err(decode)?, "booked")?,
        cancelled: row.try_get("cancelled").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn funding_from_row(row: &PgRow) -> Result<Funding, LedgerError> {
    let kind: String = row.try_get("funding").map_err(decode)?;
    let subscription_id: Option<SubscriptionId> = row.try_get("subscription_id").map_err(decode)?;
    Funding::from_columns(&kind, subscription_id)
}

fn booking_from_row(row: &PgRow) -> Result<Booking, LedgerError> {
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(Booking {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        schedule_id: row.try_get("schedule_id").map_err(decode)?,
        funding: funding_from_row(row)?,
        status: BookingStatus::parse(&status)?,
        checked_in_at: row.try_get("checked_in_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, LedgerError> {
    Ok(Subscription {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        starts_on: row.try_get("starts_on").map_err(decode)?,
        ends_on: row.try_get("ends_on").map_err(decode)?,
        classes_used: to_u32(row.try_get("classes_used").map_err(decode)?, "classes_used")?,
        classes_allowed: to_u32(row.try_get("classes_allowed").map_err(decode)?, "classes_allowed")?,
        active: row.try_get("active").map_err(decode)?,
    })
}

fn waitlist_from_row(row: &PgRow) -> Result<WaitlistEntry, LedgerError> {
    Ok(WaitlistEntry {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        schedule_id: row.try_get("schedule_id").map_err(decode)?,
        position: to_u32(row.try_get("position").map_err(decode)?, "position")?,
        funding: funding_from_row(row)?,
        promoted_at: row.try_get("promoted_at").map_err(decode)?,
        booking_id: row.try_get("booking_id").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Lock the schedule row for the rest of the transaction.
async fn lock_schedule(
    conn: &mut PgConnection,
    schedule_id: ScheduleId,
) -> Result<ScheduleInstance, LedgerError> {
    let row = sqlx::query(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedule_instances WHERE id = $1 FOR UPDATE"
    ))
    .bind(schedule_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err("failed to lock schedule"))?
    .ok_or_else(|| LedgerError::not_found("schedule", schedule_id))?;
    schedule_from_row(&row)
}

async fn holds_active_claim(
    conn: &mut PgConnection,
    user_id: UserId,
    schedule_id: ScheduleId,
) -> Result<bool, LedgerError> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM bookings \
         WHERE user_id = $1 AND schedule_id = $2 AND status IN ('booked', 'attended'))",
    )
    .bind(user_id)
    .bind(schedule_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err("failed to check existing booking"))
}

async fn consume_credit(
    conn: &mut PgConnection,
    user_id: UserId,
    funding: Funding,
) -> Result<(), LedgerError> {
    let result = match funding {
        Funding::Subscription(id) => sqlx::query(
            "UPDATE subscriptions SET classes_used = classes_used + 1 \
             WHERE id = $1 AND user_id = $2 AND active \
             AND (classes_allowed = 0 OR classes_used < classes_allowed)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *conn)
        .await,
        Funding::Invitation => sqlx::query(
            "UPDATE member_credits SET invitation_classes = invitation_classes - 1 \
             WHERE user_id = $1 AND invitation_classes > 0",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await,
    }
    .map_err(db_err("failed to consume credit"))?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::InsufficientCredit(user_id));
    }
    Ok(())
}

async fn restore_credit(conn: &mut PgConnection, booking: &Booking) -> Result<(), LedgerError> {
    match booking.funding {
        Funding::Subscription(id) => sqlx::query(
            "UPDATE subscriptions SET classes_used = GREATEST(classes_used - 1, 0) WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *conn)
        .await,
        Funding::Invitation => sqlx::query(
            "INSERT INTO member_credits (user_id, invitation_classes) VALUES ($1, 1) \
             ON CONFLICT (user_id) DO UPDATE \
             SET invitation_classes = member_credits.invitation_classes + 1",
        )
        .bind(booking.user_id)
        .execute(&mut *conn)
        .await,
    }
    .map_err(db_err("failed to restore credit"))?;
    Ok(())
}

async fn insert_booking(
    conn: &mut PgConnection,
    user_id: UserId,
    schedule_id: ScheduleId,
    funding: Funding,
) -> Result<Booking, LedgerError> {
    let row = sqlx::query(&format!(
        "INSERT INTO bookings (user_id, schedule_id, funding, subscription_id) \
         VALUES ($1, $2, $3, $4) RETURNING {BOOKING_COLUMNS}"
    ))
    .bind(user_id)
    .bind(schedule_id)
    .bind(funding.kind().as_str())
    .bind(funding.subscription_id())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_error) = &e {
            if db_error.is_unique_violation() {
                return LedgerError::DuplicateBooking {
                    user_id,
                    schedule_id,
                };
            }
        }
        LedgerError::Backend(format!("failed to insert booking: {e}"))
    })?;

    sqlx::query("UPDATE schedule_instances SET booked = booked + 1 WHERE id = $1")
        .bind(schedule_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err("failed to update seat count"))?;

    booking_from_row(&row)
}

/// First pending entry that can be funded becomes a booking; the rest of the
/// ineligible entries encountered on the way are removed.
async fn promote_next(
    conn: &mut PgConnection,
    schedule_id: ScheduleId,
) -> Result<Option<Booking>, LedgerError> {
    let rows = sqlx::query(&format!(
        "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries \
         WHERE schedule_id = $1 AND promoted_at IS NULL \
         ORDER BY position, created_at, id FOR UPDATE"
    ))
    .bind(schedule_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err("failed to read waitlist"))?;

    for row in &rows {
        let entry = waitlist_from_row(row)?;

        let skip_reason = if holds_active_claim(conn, entry.user_id, schedule_id).await? {
            Some(format!("user {} already booked", entry.user_id))
        } else {
            match consume_credit(conn, entry.user_id, entry.funding).await {
                Ok(()) => None,
                Err(e @ LedgerError::InsufficientCredit(_)) => Some(e.to_string()),
                Err(e) => return Err(e),
            }
        };

        if let Some(reason) = skip_reason {
            tracing::warn!(
                "dropping waitlist entry {} on schedule {}: {}",
                entry.id,
                schedule_id,
                reason
            );
            sqlx::query("DELETE FROM waitlist_entries WHERE id = $1")
                .bind(entry.id)
                .execute(&mut *conn)
                .await
                .map_err(db_err("failed to drop waitlist entry"))?;
            continue;
        }

        let booking = insert_booking(conn, entry.user_id, schedule_id, entry.funding).await?;
        sqlx::query("UPDATE waitlist_entries SET promoted_at = $2, booking_id = $3 WHERE id = $1")
            .bind(entry.id)
            .bind(booking.created_at)
            .bind(booking.id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("failed to mark waitlist entry promoted"))?;
        return Ok(Some(booking));
    }
    Ok(None)
}

impl PostgresStore {
    /// Wrap an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] when the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err("failed to connect"))?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema statements, applied in order by [`PostgresStore::migrate`].
    pub fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS class_templates (
    id BIGSERIAL PRIMARY KEY,
    discipline TEXT NOT NULL,
    name TEXT NOT NULL,
    day_of_week SMALLINT NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
    start_time TIME NOT NULL,
    end_time TIME NOT NULL,
    capacity INT NOT NULL CHECK (capacity > 0),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    CHECK (end_time > start_time)
)",
            r"
CREATE TABLE IF NOT EXISTS schedule_instances (
    id BIGSERIAL PRIMARY KEY,
    template_id BIGINT NOT NULL REFERENCES class_templates (id),
    date DATE NOT NULL,
    start_time TIME NOT NULL,
    capacity INT NOT NULL,
    booked INT NOT NULL DEFAULT 0,
    cancelled BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (template_id, date),
    CHECK (booked >= 0 AND booked <= capacity)
)",
            "CREATE INDEX IF NOT EXISTS idx_schedule_instances_date ON schedule_instances (date, start_time)",
            r"
CREATE TABLE IF NOT EXISTS member_credits (
    user_id BIGINT PRIMARY KEY,
    invitation_classes INT NOT NULL DEFAULT 0 CHECK (invitation_classes >= 0)
)",
            r"
CREATE TABLE IF NOT EXISTS subscriptions (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    starts_on DATE NOT NULL,
    ends_on DATE NOT NULL,
    classes_used INT NOT NULL DEFAULT 0 CHECK (classes_used >= 0),
    classes_allowed INT NOT NULL DEFAULT 0 CHECK (classes_allowed >= 0),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    CHECK (ends_on >= starts_on)
)",
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions (user_id, starts_on DESC)",
            r"
CREATE TABLE IF NOT EXISTS bookings (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    schedule_id BIGINT NOT NULL REFERENCES schedule_instances (id),
    funding TEXT NOT NULL CHECK (funding IN ('subscription', 'invitation')),
    subscription_id BIGINT REFERENCES subscriptions (id),
    status TEXT NOT NULL DEFAULT 'booked'
        CHECK (status IN ('booked', 'attended', 'cancelled', 'no_show')),
    checked_in_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK ((funding = 'subscription') = (subscription_id IS NOT NULL))
)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_active_claim ON bookings (user_id, schedule_id) WHERE status IN ('booked', 'attended')",
            "CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings (user_id, created_at DESC)",
            r"
CREATE TABLE IF NOT EXISTS waitlist_entries (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    schedule_id BIGINT NOT NULL REFERENCES schedule_instances (id),
    position INT NOT NULL,
    funding TEXT NOT NULL CHECK (funding IN ('subscription', 'invitation')),
    subscription_id BIGINT REFERENCES subscriptions (id),
    promoted_at TIMESTAMPTZ,
    booking_id BIGINT REFERENCES bookings (id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_waitlist_pending ON waitlist_entries (user_id, schedule_id) WHERE promoted_at IS NULL",
        ]
    }

    /// Apply [`PostgresStore::migrations`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] if a statement fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        for statement in Self::migrations() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err("migration failed"))?;
        }
        tracing::info!("ledger schema migrated ({} statements)", Self::migrations().len());
        Ok(())
    }

    async fn ensure_schedule(&self, schedule_id: ScheduleId) -> Result<(), LedgerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM schedule_instances WHERE id = $1)")
                .bind(schedule_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err("failed to look up schedule"))?;
        if exists {
            Ok(())
        } else {
            Err(LedgerError::not_found("schedule", schedule_id))
        }
    }

    async fn schedule_of_booking(
        conn: &mut PgConnection,
        booking_id: BookingId,
        user_id: Option<UserId>,
    ) -> Result<ScheduleId, LedgerError> {
        sqlx::query_scalar(
            "SELECT schedule_id FROM bookings WHERE id = $1 AND ($2::BIGINT IS NULL OR user_id = $2)",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("failed to look up booking"))?
        .ok_or_else(|| LedgerError::not_found("booking", booking_id))
    }

    async fn lock_booking(
        conn: &mut PgConnection,
        booking_id: BookingId,
    ) -> Result<Booking, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("failed to lock booking"))?
        .ok_or_else(|| LedgerError::not_found("booking", booking_id))?;
        booking_from_row(&row)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn create_template(
        &self,
        template: NewClassTemplate,
    ) -> Result<ClassTemplate, LedgerError> {
        template.validate()?;
        let row = sqlx::query(&format!(
            "INSERT INTO class_templates (discipline, name, day_of_week, start_time, end_time, capacity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(&template.discipline)
        .bind(&template.name)
        .bind(weekday_to_db(template.day_of_week))
        .bind(template.start_time)
        .bind(template.end_time)
        .bind(to_i32(template.capacity, "capacity")?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("failed to create template"))?;
        template_from_row(&row)
    }

    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<ClassTemplate, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM class_templates WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("failed to lock template"))?
        .ok_or_else(|| LedgerError::not_found("template", id))?;

        let mut template = template_from_row(&row)?;
        update.apply(&mut template)?;

        sqlx::query(
            "UPDATE class_templates SET name = $2, start_time = $3, end_time = $4, capacity = $5, active = $6 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&template.name)
        .bind(template.start_time)
        .bind(template.end_time)
        .bind(to_i32(template.capacity, "capacity")?)
        .bind(template.active)
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to update template"))?;
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        Ok(template)
    }

    async fn template(&self, id: TemplateId) -> Result<ClassTemplate, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM class_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get template"))?
        .ok_or_else(|| LedgerError::not_found("template", id))?;
        template_from_row(&row)
    }

    async fn generate_schedules(
        &self,
        start: NaiveDate,
        days: u32,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let mut created = Vec::new();
        for offset in 0..days {
            let date = start
                .checked_add_days(Days::new(u64::from(offset)))
                .ok_or_else(|| LedgerError::Invalid(format!("date out of range: {start} + {offset}")))?;
            let rows = sqlx::query(&format!(
                "INSERT INTO schedule_instances (template_id, date, start_time, capacity) \
                 SELECT id, $1, start_time, capacity FROM class_templates \
                 WHERE active AND day_of_week = $2 \
                 ON CONFLICT (template_id, date) DO NOTHING \
                 RETURNING {SCHEDULE_COLUMNS}"
            ))
            .bind(date)
            .bind(weekday_to_db(date.weekday()))
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err("failed to generate schedules"))?;
            for row in &rows {
                created.push(schedule_from_row(row)?);
            }
        }
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        created.sort_by_key(|s| (s.date, s.start_time, s.id));
        Ok(created)
    }

    async fn schedule(&self, id: ScheduleId) -> Result<ScheduleInstance, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedule_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get schedule"))?
        .ok_or_else(|| LedgerError::not_found("schedule", id))?;
        schedule_from_row(&row)
    }

    async fn list_schedules(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedule_instances \
             WHERE date BETWEEN $1 AND $2 ORDER BY date, start_time, id"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to list schedules"))?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, LedgerError> {
        if subscription.ends_on < subscription.starts_on {
            return Err(LedgerError::Invalid(
                "subscription ends before it starts".into(),
            ));
        }
        let row = sqlx::query(&format!(
            "INSERT INTO subscriptions (user_id, starts_on, ends_on, classes_allowed) \
             VALUES ($1, $2, $3, $4) RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription.user_id)
        .bind(subscription.starts_on)
        .bind(subscription.ends_on)
        .bind(to_i32(subscription.classes_allowed, "classes_allowed")?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("failed to create subscription"))?;
        subscription_from_row(&row)
    }

    async fn subscription(&self, id: SubscriptionId) -> Result<Subscription, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get subscription"))?
        .ok_or_else(|| LedgerError::not_found("subscription", id))?;
        subscription_from_row(&row)
    }

    async fn active_subscription(
        &self,
        user_id: UserId,
        on: NaiveDate,
    ) -> Result<Option<Subscription>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE user_id = $1 AND active AND starts_on <= $2 AND ends_on >= $2 \
             ORDER BY starts_on DESC, id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(on)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get active subscription"))?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn grant_invitations(&self, user_id: UserId, count: u32) -> Result<u32, LedgerError> {
        if count == 0 {
            return Err(LedgerError::Invalid("grant count must be greater than 0".into()));
        }
        let balance: i32 = sqlx::query_scalar(
            "INSERT INTO member_credits (user_id, invitation_classes) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE \
             SET invitation_classes = member_credits.invitation_classes + EXCLUDED.invitation_classes \
             RETURNING invitation_classes",
        )
        .bind(user_id)
        .bind(to_i32(count, "count")?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("failed to grant invitations"))?;
        to_u32(balance, "invitation_classes")
    }

    async fn invitation_balance(&self, user_id: UserId) -> Result<u32, LedgerError> {
        let balance: Option<i32> =
            sqlx::query_scalar("SELECT invitation_classes FROM member_credits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("failed to get invitation balance"))?;
        to_u32(balance.unwrap_or(0), "invitation_classes")
    }

    async fn create_booking(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
    ) -> Result<Booking, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let schedule = lock_schedule(&mut tx, schedule_id).await?;
        schedule.ensure_bookable()?;
        if holds_active_claim(&mut tx, user_id, schedule_id).await? {
            return Err(LedgerError::DuplicateBooking {
                user_id,
                schedule_id,
            });
        }
        consume_credit(&mut tx, user_id, funding).await?;
        let booking = insert_booking(&mut tx, user_id, schedule_id, funding).await?;
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        Ok(booking)
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<CancelOutcome, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let schedule_id = Self::schedule_of_booking(&mut tx, booking_id, Some(user_id)).await?;
        let schedule = lock_schedule(&mut tx, schedule_id).await?;
        let booking = Self::lock_booking(&mut tx, booking_id).await?;

        match booking.status {
            BookingStatus::Booked => {}
            BookingStatus::Cancelled => {
                return Err(LedgerError::AlreadyCancelled {
                    entity: "booking",
                    id: booking_id,
                })
            }
            from => {
                return Err(LedgerError::InvalidTransition {
                    from,
                    to: BookingStatus::Cancelled,
                })
            }
        }

        let row = sqlx::query(&format!(
            "UPDATE bookings SET status = 'cancelled' WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("failed to cancel booking"))?;
        let booking = booking_from_row(&row)?;

        sqlx::query("UPDATE schedule_instances SET booked = GREATEST(booked - 1, 0) WHERE id = $1")
            .bind(schedule_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("failed to release seat"))?;
        restore_credit(&mut tx, &booking).await?;

        let promoted = if schedule.cancelled {
            None
        } else {
            promote_next(&mut tx, schedule_id).await?
        };

        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        Ok(CancelOutcome {
            restored: booking.funding.kind(),
            booking,
            promoted,
        })
    }

    async fn check_in(&self, booking_id: BookingId) -> Result<Booking, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let schedule_id = Self::schedule_of_booking(&mut tx, booking_id, None).await?;
        lock_schedule(&mut tx, schedule_id).await?;
        let booking = Self::lock_booking(&mut tx, booking_id).await?;
        if booking.status != BookingStatus::Booked {
            return Err(LedgerError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Attended,
            });
        }
        let row = sqlx::query(&format!(
            "UPDATE bookings SET status = 'attended', checked_in_at = NOW() \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("failed to check in"))?;
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        booking_from_row(&row)
    }

    async fn booking(&self, id: BookingId) -> Result<Booking, LedgerError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("failed to get booking"))?
            .ok_or_else(|| LedgerError::not_found("booking", id))?;
        booking_from_row(&row)
    }

    async fn list_schedule_bookings(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Booking>, LedgerError> {
        self.ensure_schedule(schedule_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE schedule_id = $1 ORDER BY created_at, id"
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to list bookings"))?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to list user bookings"))?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn cancel_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let schedule = lock_schedule(&mut tx, schedule_id).await?;
        if schedule.cancelled {
            return Err(LedgerError::AlreadyCancelled {
                entity: "schedule",
                id: schedule_id,
            });
        }

        let rows = sqlx::query(&format!(
            "UPDATE bookings SET status = 'cancelled' \
             WHERE schedule_id = $1 AND status = 'booked' RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(schedule_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("failed to cancel bookings"))?;
        let mut cancelled = rows
            .iter()
            .map(booking_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        cancelled.sort_by_key(|b| b.id);

        for booking in &cancelled {
            restore_credit(&mut tx, booking).await?;
        }

        sqlx::query(
            "UPDATE schedule_instances SET cancelled = TRUE, \
             booked = (SELECT COUNT(*) FROM bookings WHERE schedule_id = $1 AND status = 'attended') \
             WHERE id = $1",
        )
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to cancel schedule"))?;

        sqlx::query("DELETE FROM waitlist_entries WHERE schedule_id = $1 AND promoted_at IS NULL")
            .bind(schedule_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("failed to clear waitlist"))?;

        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        Ok(cancelled)
    }

    async fn join_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        funding: Funding,
        max_depth: usize,
    ) -> Result<WaitlistEntry, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        let schedule = lock_schedule(&mut tx, schedule_id).await?;
        if schedule.cancelled {
            return Err(LedgerError::ScheduleCancelled(schedule_id));
        }
        if !schedule.is_full() {
            return Err(LedgerError::SeatsAvailable(schedule_id));
        }
        if holds_active_claim(&mut tx, user_id, schedule_id).await? {
            return Err(LedgerError::DuplicateBooking {
                user_id,
                schedule_id,
            });
        }

        let (pending, queued_by_user, last_position): (i64, bool, i32) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE promoted_at IS NULL), \
             COALESCE(BOOL_OR(user_id = $2 AND promoted_at IS NULL), FALSE), \
             COALESCE(MAX(position), 0) \
             FROM waitlist_entries WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("failed to read waitlist"))?;

        if queued_by_user {
            return Err(LedgerError::AlreadyWaitlisted {
                user_id,
                schedule_id,
            });
        }
        if usize::try_from(pending).unwrap_or(usize::MAX) >= max_depth {
            return Err(LedgerError::WaitlistFull(schedule_id));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO waitlist_entries (user_id, schedule_id, position, funding, subscription_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {WAITLIST_COLUMNS}"
        ))
        .bind(user_id)
        .bind(schedule_id)
        .bind(last_position + 1)
        .bind(funding.kind().as_str())
        .bind(funding.subscription_id())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("failed to join waitlist"))?;
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        waitlist_from_row(&row)
    }

    async fn leave_waitlist(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to start transaction"))?;
        lock_schedule(&mut tx, schedule_id).await?;
        let row = sqlx::query(&format!(
            "DELETE FROM waitlist_entries \
             WHERE user_id = $1 AND schedule_id = $2 AND promoted_at IS NULL \
             RETURNING {WAITLIST_COLUMNS}"
        ))
        .bind(user_id)
        .bind(schedule_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("failed to leave waitlist"))?
        .ok_or_else(|| LedgerError::not_found("waitlist entry for schedule", schedule_id))?;
        tx.commit().await.map_err(db_err("failed to commit transaction"))?;
        waitlist_from_row(&row)
    }

    async fn waitlist(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntry>, LedgerError> {
        self.ensure_schedule(schedule_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries \
             WHERE schedule_id = $1 ORDER BY position, created_at, id"
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to list waitlist"))?;
        rows.iter().map(waitlist_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekdays_are_stored_sunday_first() {
        assert_eq!(weekday_to_db(Weekday::Sun), 0);
        assert_eq!(weekday_to_db(Weekday::Sat), 6);
        for n in 0..7 {
            assert_eq!(weekday_to_db(weekday_from_db(n).unwrap()), n);
        }
        assert!(weekday_from_db(7).is_err());
    }

    #[test]
    fn migrations_keep_claims_unique_per_member() {
        let ddl = PostgresStore::migrations().join("\n");
        assert!(ddl.contains("UNIQUE (template_id, date)"));
        assert!(ddl.contains("idx_bookings_active_claim"));
        assert!(ddl.contains("CHECK (invitation_classes >= 0)"));
    }
}
