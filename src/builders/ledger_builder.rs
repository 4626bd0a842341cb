//! Builder to construct a [`BookingLedger`] from [`LedgerConfig`].

use std::sync::Arc;

use anyhow::Context;

use crate::config::{LedgerConfig, OutboxConfig, StorageConfig};
use crate::core::{
    AppResult, BookingLedger, InMemoryAuditSink, LedgerError, LedgerStore, NotificationTrigger,
    OutboxNotifier, Spawn,
};
use crate::infra::{FileOutbox, InMemoryOutbox, InMemoryStore, OutboxHandle};
use crate::util::Clock;

/// Build the notification trigger selected by `cfg`, dispatching on `spawner`,
/// together with a handle to the outbox it delivers into.
///
/// # Errors
///
/// Returns [`LedgerError::Backend`] when a file outbox cannot be opened.
pub fn build_notifier<S>(
    cfg: &OutboxConfig,
    spawner: S,
) -> Result<Option<(Arc<dyn NotificationTrigger>, OutboxHandle)>, LedgerError>
where
    S: Spawn + Send + Sync + 'static,
{
    let built: Option<(Arc<dyn NotificationTrigger>, OutboxHandle)> = match cfg {
        OutboxConfig::Disabled => None,
        OutboxConfig::InMemory => {
            let notifier = OutboxNotifier::new(InMemoryOutbox::new(), spawner);
            let handle = OutboxHandle::InMemory(notifier.outbox());
            Some((Arc::new(notifier), handle))
        }
        OutboxConfig::File { path, stream } => {
            let notifier = OutboxNotifier::new(FileOutbox::new(path, stream.as_str())?, spawner);
            let handle = OutboxHandle::File(notifier.outbox());
            Some((Arc::new(notifier), handle))
        }
    };
    Ok(built)
}

/// Assembles a ledger: validates configuration, attaches audit and
/// notification plumbing, then wires the selected store.
pub struct LedgerBuilder {
    cfg: LedgerConfig,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn NotificationTrigger>>,
    outbox: Option<OutboxHandle>,
}

impl LedgerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(cfg: LedgerConfig) -> Self {
        Self {
            cfg,
            clock: None,
            notifier: None,
            outbox: None,
        }
    }

    /// Start from configuration read from the process environment (and `.env`).
    ///
    /// # Errors
    ///
    /// Fails when a variable cannot be parsed or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let cfg = LedgerConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("invalid ledger configuration")?;
        Ok(Self::new(cfg))
    }

    /// Start from configuration read through `lookup`; see [`LedgerConfig::from_lookup`].
    ///
    /// # Errors
    ///
    /// Fails when a variable cannot be parsed or the result does not validate.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = LedgerConfig::from_lookup(lookup)
            .map_err(anyhow::Error::msg)
            .context("invalid ledger configuration")?;
        Ok(Self::new(cfg))
    }

    /// Override the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an explicit notification trigger instead of the configured outbox.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationTrigger>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the configured outbox notifier on `spawner`, unless a notifier
    /// was set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] when the outbox cannot be opened.
    pub fn with_spawner<S>(mut self, spawner: S) -> Result<Self, LedgerError>
    where
        S: Spawn + Send + Sync + 'static,
    {
        if self.notifier.is_none() {
            if let Some((notifier, outbox)) = build_notifier(&self.cfg.outbox, spawner)? {
                self.notifier = Some(notifier);
                self.outbox = Some(outbox);
            }
        }
        Ok(self)
    }

    /// Handle to the configured outbox, once [`LedgerBuilder::with_spawner`]
    /// has built it. Keep it to forward and drain delivered notifications.
    #[must_use]
    pub fn outbox(&self) -> Option<OutboxHandle> {
        self.outbox.clone()
    }

    /// The configuration being built.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.cfg
    }

    /// Wire the ledger over an already constructed store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] when the configuration does not validate.
    pub fn build_with_store<S: LedgerStore>(self, store: Arc<S>) -> Result<BookingLedger<S>, LedgerError> {
        self.cfg
            .validate()
            .map_err(|e| LedgerError::Invalid(format!("config invalid: {e}")))?;

        let mut ledger = BookingLedger::new(store)
            .with_booking_window(self.cfg.booking_window)
            .with_generation_days(self.cfg.generation_days)
            .with_max_waitlist_depth(self.cfg.max_waitlist_depth);
        if let Some(clock) = self.clock {
            ledger = ledger.with_clock(clock);
        }
        if let Some(notifier) = self.notifier {
            ledger = ledger.with_notifier(notifier);
        }
        if self.cfg.audit_buffer > 0 {
            ledger = ledger.with_audit(Box::new(InMemoryAuditSink::new(self.cfg.audit_buffer)));
        }
        tracing::info!(
            "ledger built: window {}d/{}h, generation {}d, waitlist depth {}",
            self.cfg.booking_window.window_days,
            self.cfg.booking_window.cutoff_hours,
            self.cfg.generation_days,
            self.cfg.max_waitlist_depth
        );
        Ok(ledger)
    }

    /// Build over a fresh [`InMemoryStore`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] when the configuration selects another
    /// backend or does not validate.
    pub fn build_in_memory(self) -> Result<BookingLedger<InMemoryStore>, LedgerError> {
        if self.cfg.storage != StorageConfig::InMemory {
            return Err(LedgerError::Invalid(
                "configuration does not select the in-memory store".into(),
            ));
        }
        self.build_with_store(Arc::new(InMemoryStore::new()))
    }

    /// Connect to Postgres, apply migrations, and build.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] when the configuration selects another
    /// backend, or [`LedgerError::Backend`] when connecting or migrating fails.
    #[cfg(feature = "postgres")]
    pub async fn build_postgres(
        self,
    ) -> Result<BookingLedger<crate::infra::PostgresStore>, LedgerError> {
        let StorageConfig::Postgres {
            url,
            max_connections,
        } = &self.cfg.storage
        else {
            return Err(LedgerError::Invalid(
                "configuration does not select the postgres store".into(),
            ));
        };
        let store = crate::infra::PostgresStore::connect(url, *max_connections).await?;
        store.migrate().await?;
        self.build_with_store(Arc::new(store))
    }
}
