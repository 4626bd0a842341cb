//! File-backed outbox using JSON lines for durability.

use std::collections::HashMap;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{select, OutboxMessage};
use crate::core::{LedgerError, Notification, Outbox};
use crate::util::UserId;

/// Appends every notification to `<path>/<stream>_outbox.jsonl` and replays
/// the file on open, so an external sender can resume after a restart.
pub struct FileOutbox {
    path: PathBuf,
    stream: String,
    messages: HashMap<UserId, Vec<OutboxMessage>>,
}

fn io_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Backend(e.to_string())
}

impl FileOutbox {
    /// Open (or create) an outbox persisted under `path` for `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] if the directory cannot be created or
    /// an existing file cannot be parsed.
    pub fn new(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path).map_err(io_err)?;
        let mut outbox = Self {
            path,
            stream: stream.into(),
            messages: HashMap::new(),
        };
        outbox.load_from_disk()?;
        Ok(outbox)
    }

    /// Location of the backing file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}_outbox.jsonl", self.stream))
    }

    fn load_from_disk(&mut self) -> Result<(), LedgerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(io_err)?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let msg: OutboxMessage = serde_json::from_str(&line).map_err(io_err)?;
            self.messages
                .entry(msg.notification.recipient())
                .or_default()
                .push(msg);
        }
        Ok(())
    }

    fn append_to_disk(&self, msg: &OutboxMessage) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())
            .map_err(io_err)?;
        let line = serde_json::to_string(msg).map_err(io_err)?;
        writeln!(file, "{line}").map_err(io_err)
    }

    /// Fetch a member's messages, optionally since a timestamp.
    #[must_use]
    pub fn fetch(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<OutboxMessage> {
        select(self.messages.get(&user_id), since, limit)
    }
}

impl Outbox for FileOutbox {
    fn deliver(&mut self, notification: &Notification) -> Result<(), LedgerError> {
        let msg = OutboxMessage {
            notification: notification.clone(),
            created_at: Utc::now(),
        };
        self.append_to_disk(&msg)?;
        self.messages
            .entry(notification.recipient())
            .or_default()
            .push(msg);
        Ok(())
    }
}
