//! Booking window policy.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::model::ScheduleInstance;
use crate::core::LedgerError;

/// When members may book a session, relative to its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    /// Bookings open this many days before the start (0 = no limit).
    pub window_days: u32,
    /// Bookings close this many hours before the start (0 = until start).
    pub cutoff_hours: u32,
}

impl Default for BookingWindow {
    fn default() -> Self {
        Self {
            window_days: 7,
            cutoff_hours: 1,
        }
    }
}

impl BookingWindow {
    /// A window that accepts any booking made before the session starts.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            window_days: 0,
            cutoff_hours: 0,
        }
    }

    /// Check that `schedule` accepts bookings at `now`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::BookingNotOpen`] before the window opens,
    /// [`LedgerError::BookingClosed`] after the cutoff or once the session started.
    pub fn check(&self, schedule: &ScheduleInstance, now: NaiveDateTime) -> Result<(), LedgerError> {
        let starts_at = schedule.starts_at();
        if now >= starts_at {
            return Err(LedgerError::BookingClosed(schedule.id));
        }
        // A window reaching past the calendar range is always open.
        if self.window_days > 0 {
            if let Some(opens_at) =
                starts_at.checked_sub_signed(Duration::days(i64::from(self.window_days)))
            {
                if now < opens_at {
                    return Err(LedgerError::BookingNotOpen {
                        schedule_id: schedule.id,
                        opens_at,
                    });
                }
            }
        }
        if self.cutoff_hours > 0 {
            if let Some(closes_at) =
                starts_at.checked_sub_signed(Duration::hours(i64::from(self.cutoff_hours)))
            {
                if now > closes_at {
                    return Err(LedgerError::BookingClosed(schedule.id));
                }
            }
        }
        Ok(())
    }
}
