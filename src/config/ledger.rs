//! Ledger configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::ledger::{DEFAULT_GENERATION_DAYS, DEFAULT_MAX_WAITLIST_DEPTH};
use crate::core::BookingWindow;

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local store.
    InMemory,
    /// Postgres store (requires the `postgres` feature).
    Postgres {
        /// Connection URL.
        url: String,
        /// Pool size.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

const fn default_max_connections() -> u32 {
    10
}

/// Largest accepted `booking_window.window_days` and `generation_days`.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Largest accepted `booking_window.cutoff_hours`.
pub const MAX_CUTOFF_HOURS: u32 = 24 * 14;

/// Notification outbox selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxConfig {
    /// Notifications are dropped.
    Disabled,
    /// In-memory outbox.
    InMemory,
    /// JSON-lines file outbox.
    File {
        /// Directory holding the outbox file.
        path: String,
        /// Stream name, used as the file prefix.
        stream: String,
    },
}

/// Root ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Storage backend.
    pub storage: StorageConfig,
    /// Notification outbox.
    pub outbox: OutboxConfig,
    /// When bookings open and close.
    pub booking_window: BookingWindow,
    /// Days expanded by one generator run.
    pub generation_days: u32,
    /// Pending waitlist entries allowed per schedule (0 disables waitlists).
    pub max_waitlist_depth: usize,
    /// Audit events kept in memory (0 disables the audit trail).
    pub audit_buffer: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::InMemory,
            outbox: OutboxConfig::Disabled,
            booking_window: BookingWindow::default(),
            generation_days: DEFAULT_GENERATION_DAYS,
            max_waitlist_depth: DEFAULT_MAX_WAITLIST_DEPTH,
            audit_buffer: 1024,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{name}: cannot parse `{raw}`: {e}"))
        })
        .transpose()
}

impl LedgerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.generation_days == 0 {
            return Err("generation_days must be greater than 0".into());
        }
        if self.generation_days > MAX_HORIZON_DAYS {
            return Err(format!("generation_days must not exceed {MAX_HORIZON_DAYS}"));
        }
        if self.booking_window.window_days > MAX_HORIZON_DAYS {
            return Err(format!("booking window must not exceed {MAX_HORIZON_DAYS} days"));
        }
        if self.booking_window.cutoff_hours > MAX_CUTOFF_HOURS {
            return Err(format!("booking cutoff must not exceed {MAX_CUTOFF_HOURS} hours"));
        }
        if let StorageConfig::Postgres {
            url,
            max_connections,
        } = &self.storage
        {
            if url.trim().is_empty() {
                return Err("postgres url must not be empty".into());
            }
            if *max_connections == 0 {
                return Err("max_connections must be greater than 0".into());
            }
        }
        if let OutboxConfig::File { path, stream } = &self.outbox {
            if path.trim().is_empty() || stream.trim().is_empty() {
                return Err("file outbox needs a path and a stream".into());
            }
        }
        Ok(())
    }

    /// Parse ledger configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, after reading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from a variable lookup, starting from defaults.
    ///
    /// Recognised variables: `DATABASE_URL`, `STUDIO_DB_MAX_CONNECTIONS`,
    /// `BOOKING_WINDOW_DAYS`, `BOOKING_CUTOFF_HOURS`, `STUDIO_GENERATION_DAYS`,
    /// `STUDIO_MAX_WAITLIST_DEPTH`, `STUDIO_AUDIT_BUFFER`, `STUDIO_OUTBOX`
    /// (`disabled`, `memory`, or `file`), `STUDIO_OUTBOX_PATH`, `STUDIO_OUTBOX_STREAM`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(url) = var("DATABASE_URL") {
            cfg.storage = StorageConfig::Postgres {
                url,
                max_connections: parse_var("STUDIO_DB_MAX_CONNECTIONS", var("STUDIO_DB_MAX_CONNECTIONS"))?
                    .unwrap_or_else(default_max_connections),
            };
        }
        if let Some(days) = parse_var("BOOKING_WINDOW_DAYS", var("BOOKING_WINDOW_DAYS"))? {
            cfg.booking_window.window_days = days;
        }
        if let Some(hours) = parse_var("BOOKING_CUTOFF_HOURS", var("BOOKING_CUTOFF_HOURS"))? {
            cfg.booking_window.cutoff_hours = hours;
        }
        if let Some(days) = parse_var("STUDIO_GENERATION_DAYS", var("STUDIO_GENERATION_DAYS"))? {
            cfg.generation_days = days;
        }
        if let Some(depth) = parse_var("STUDIO_MAX_WAITLIST_DEPTH", var("STUDIO_MAX_WAITLIST_DEPTH"))? {
            cfg.max_waitlist_depth = depth;
        }
        if let Some(buffer) = parse_var("STUDIO_AUDIT_BUFFER", var("STUDIO_AUDIT_BUFFER"))? {
            cfg.audit_buffer = buffer;
        }
        cfg.outbox = match var("STUDIO_OUTBOX").as_deref().map(str::trim) {
            None | Some("disabled") => OutboxConfig::Disabled,
            Some("memory" | "in_memory") => OutboxConfig::InMemory,
            Some("file") => OutboxConfig::File {
                path: var("STUDIO_OUTBOX_PATH").unwrap_or_else(|| "./outbox".into()),
                stream: var("STUDIO_OUTBOX_STREAM").unwrap_or_else(|| "notifications".into()),
            },
            Some(other) => return Err(format!("STUDIO_OUTBOX: unknown outbox `{other}`")),
        };

        cfg.validate()?;
        Ok(cfg)
    }
}
