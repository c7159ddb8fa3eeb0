//! Crash-recovery snapshot of queue progress.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store;

/// Durable copy of the orchestrator's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub source_queue_path: PathBuf,
    pub current_index: usize,
    #[serde(default)]
    pub session_ink_total: f64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

/// Single-slot snapshot file; every save overwrites it.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        store::write_json(&self.path, snapshot)
    }

    /// `Ok(None)` when no snapshot exists; an error when one exists but is
    /// unreadable.
    pub fn load(&self) -> Result<Option<SessionSnapshot>> {
        store::read_json(&self.path)
    }

    pub fn clear(&self) -> Result<()> {
        store::remove(&self.path)
    }
}
