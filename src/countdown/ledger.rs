//! Client-local penalty ledger.
//!
//! Penalties accumulate per `(user, form variant)` for the attempt that began
//! at `started_at`. A stored ledger that belongs to a different start time
//! is stale and gets replaced by an empty one. The ledger lives in storage
//! the user controls; clearing it clears the penalty.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attempt::{FormVariant, UserId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub user_id: UserId,
    pub form_variant: FormVariant,
}

impl LedgerKey {
    pub fn new(user_id: UserId, form_variant: FormVariant) -> Self {
        Self {
            user_id,
            form_variant,
        }
    }

    /// Flat storage key, e.g. `wl_penalty_1234_A`.
    pub fn storage_key(&self) -> String {
        format!("wl_penalty_{}_{}", self.user_id, self.form_variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyLedger {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub penalty_seconds: u64,
}

impl PenaltyLedger {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            penalty_seconds: 0,
        }
    }

    /// Keep `stored` only if it belongs to the attempt that began at `started_at`.
    pub fn adopt(stored: Option<PenaltyLedger>, started_at: DateTime<Utc>) -> Self {
        match stored {
            Some(ledger) if ledger.started_at == started_at => ledger,
            _ => Self::new(started_at),
        }
    }
}

pub trait LedgerStore: Send + Sync {
    fn load(&self, key: &LedgerKey) -> Result<Option<PenaltyLedger>, LedgerError>;

    fn save(&self, key: &LedgerKey, ledger: &PenaltyLedger) -> Result<(), LedgerError>;
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<HashMap<String, PenaltyLedger>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self, key: &LedgerKey) -> Result<Option<PenaltyLedger>, LedgerError> {
        Ok(self.entries.lock().get(&key.storage_key()).cloned())
    }

    fn save(&self, key: &LedgerKey, ledger: &PenaltyLedger) -> Result<(), LedgerError> {
        self.entries
            .lock()
            .insert(key.storage_key(), ledger.clone());
        Ok(())
    }
}

/// Ledgers kept in one JSON object on disk, keyed by [`LedgerKey::storage_key`].
#[derive(Debug)]
pub struct FileLedgerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, PenaltyLedger>, LedgerError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self, key: &LedgerKey) -> Result<Option<PenaltyLedger>, LedgerError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(&key.storage_key()))
    }

    fn save(&self, key: &LedgerKey, ledger: &PenaltyLedger) -> Result<(), LedgerError> {
        let _guard = self.lock.lock();
        let mut all = self.read_all()?;
        all.insert(key.storage_key(), ledger.clone());
        fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}
