use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::batch::{BatchStats, STATS_FILE};
use crate::error::{LinecraftError, Result};

/// Ink charged for a job missing from the batch stats file, in meters.
pub const DEFAULT_JOB_INK_M: f64 = 0.5;

/// The result of one device invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success,
    Failure(String),
}

/// One generated document ready to plot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledJob {
    pub document: PathBuf,
    /// Estimated ink, in meters.
    pub ink_m: f64,
}

impl CompiledJob {
    pub fn file_name(&self) -> String {
        self.document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Ordered jobs of one batch directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobQueue {
    pub source: PathBuf,
    pub jobs: Vec<CompiledJob>,
}

impl JobQueue {
    pub fn new(source: impl Into<PathBuf>, jobs: Vec<CompiledJob>) -> Self {
        Self {
            source: source.into(),
            jobs,
        }
    }

    /// Reads every `*.svg` in `batch_dir`, sorted by name, with ink figures
    /// from the stats file. A missing stats file charges the default per job;
    /// an unreadable one is an error.
    pub fn load(batch_dir: &Path) -> Result<Self> {
        if !batch_dir.is_dir() {
            return Err(LinecraftError::Config("No batch folder".into()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(batch_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "svg"))
            .collect();
        if files.is_empty() {
            return Err(LinecraftError::Config("No SVGs found".into()));
        }
        files.sort();

        let stats_path = batch_dir.join(STATS_FILE);
        let stats: BatchStats = if stats_path.is_file() {
            let raw = std::fs::read_to_string(&stats_path)?;
            serde_json::from_str(&raw).map_err(|e| {
                LinecraftError::Validation(format!("{}: {e}", stats_path.display()))
            })?
        } else {
            warn!(path = %stats_path.display(), "no batch stats; charging default ink per job");
            BatchStats::new()
        };

        let jobs: Vec<CompiledJob> = files
            .into_iter()
            .map(|document| {
                let name = document
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let ink_m = stats.get(&name).copied().unwrap_or(DEFAULT_JOB_INK_M);
                CompiledJob { document, ink_m }
            })
            .collect();

        debug!(source = %batch_dir.display(), jobs = jobs.len(), "queue loaded");
        Ok(Self::new(batch_dir, jobs))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CompiledJob> {
        self.jobs.get(index)
    }
}
