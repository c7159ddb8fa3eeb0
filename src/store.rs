//! Whole-file JSON persistence shared by the inventory and session files.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LinecraftError, Result};

/// Serialises `value` next to `path` and renames it into place, so readers
/// see either the previous file or the new one.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LinecraftError::persistence(path, e))?;
    }
    std::fs::write(&tmp, json).map_err(|e| LinecraftError::persistence(path, e))?;
    std::fs::rename(&tmp, path).map_err(|e| LinecraftError::persistence(path, e))?;
    Ok(())
}

/// `Ok(None)` when the file does not exist; `CorruptState` when it cannot be
/// parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| LinecraftError::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Deletes `path`; a file that is already gone is fine.
pub fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LinecraftError::persistence(path, e)),
    }
}
