use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = LinecraftError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LinecraftError {
    /// Missing template, table or font at setup time. Fatal to the call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structurally invalid input (row data, glyph library, path data).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A durable file exists but cannot be understood.
    #[error("Corrupt state file {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure reported by the external plotting device.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("could not launch `{program}`: {reason}")]
    Launch { program: String, reason: String },

    #[error("`{program}` exited with status {code}")]
    Exit { program: String, code: i32 },

    #[error("`{program}` was terminated by a signal")]
    Killed { program: String },

    #[error("device worker panicked: {0}")]
    Worker(String),
}

impl LinecraftError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}
