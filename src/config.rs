//! Linecraft configuration loaded from `linecraft.toml`.
//!
//! [`LinecraftConfig`] holds every tunable parameter. Values missing from the
//! file fall back to sensible defaults. The `LINECRAFT_AXICLI` environment
//! variable takes precedence over the file for the plotter executable.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::device::PlotterSettings;

pub const CONFIG_FILE: &str = "linecraft.toml";
pub const AXICLI_ENV: &str = "LINECRAFT_AXICLI";

/// Top-level configuration loaded from `linecraft.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinecraftConfig {
    /// Folder holding `variable/` and `standard/` glyph libraries.
    #[serde(default = "default_font_dir")]
    pub font_dir: PathBuf,

    /// Font used by `generate` when none is given on the command line.
    #[serde(default = "default_font")]
    pub default_font: String,

    /// Body text template; `{FIELD}` tokens are replaced per row.
    #[serde(default)]
    pub body_template: Option<String>,

    #[serde(default = "default_inventory_file")]
    pub inventory_file: PathBuf,

    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Layout offset added to every text block position.
    #[serde(default)]
    pub offset_x: f64,

    #[serde(default)]
    pub offset_y: f64,

    #[serde(default)]
    pub plotter: PlotterConfig,
}

/// The `[plotter]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotterConfig {
    #[serde(default = "default_axicli_path")]
    pub axicli_path: PathBuf,

    /// An axicli config file. When set it replaces the individual speeds.
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    #[serde(default = "default_pendown_speed")]
    pub pendown_speed: u32,

    #[serde(default = "default_penup_speed")]
    pub penup_speed: u32,

    #[serde(default = "default_rate")]
    pub acceleration: u32,

    #[serde(default = "default_rate")]
    pub pen_lower_rate: u32,

    #[serde(default = "default_rate")]
    pub pen_raise_rate: u32,
}

fn default_font_dir() -> PathBuf {
    PathBuf::from("font_library")
}

fn default_font() -> String {
    "primary_variation".to_string()
}

fn default_inventory_file() -> PathBuf {
    PathBuf::from("pen_inventory.json")
}

fn default_session_file() -> PathBuf {
    PathBuf::from("session_state.json")
}

fn default_axicli_path() -> PathBuf {
    PathBuf::from("axicli")
}

// Writing speed, 1-100.
fn default_pendown_speed() -> u32 {
    25
}

// Travel speed, 1-100.
fn default_penup_speed() -> u32 {
    75
}

fn default_rate() -> u32 {
    50
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            axicli_path: default_axicli_path(),
            config_file: None,
            pendown_speed: default_pendown_speed(),
            penup_speed: default_penup_speed(),
            acceleration: default_rate(),
            pen_lower_rate: default_rate(),
            pen_raise_rate: default_rate(),
        }
    }
}

impl PlotterConfig {
    pub fn settings(&self) -> PlotterSettings {
        PlotterSettings {
            pendown_speed: self.pendown_speed,
            penup_speed: self.penup_speed,
            acceleration: self.acceleration,
            pen_lower_rate: self.pen_lower_rate,
            pen_raise_rate: self.pen_raise_rate,
        }
    }
}

impl Default for LinecraftConfig {
    fn default() -> Self {
        Self {
            font_dir: default_font_dir(),
            default_font: default_font(),
            body_template: None,
            inventory_file: default_inventory_file(),
            session_file: default_session_file(),
            offset_x: 0.0,
            offset_y: 0.0,
            plotter: PlotterConfig::default(),
        }
    }
}

impl LinecraftConfig {
    /// Loads `linecraft.toml` from the current directory, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<LinecraftConfig>(&contents)
                .with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(axicli) = std::env::var(AXICLI_ENV) {
            if !axicli.is_empty() {
                config.plotter.axicli_path = PathBuf::from(axicli);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = LinecraftConfig::default();
        assert_eq!(config.default_font, "primary_variation");
        assert_eq!(config.inventory_file, PathBuf::from("pen_inventory.json"));
        assert_eq!(config.session_file, PathBuf::from("session_state.json"));
        assert_eq!(config.plotter.pendown_speed, 25);
        assert_eq!(config.plotter.penup_speed, 75);
        assert_eq!(config.plotter.acceleration, 50);
        assert!(config.body_template.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            default_font = "cursive"
            offset_x = 2.5

            [plotter]
            pendown_speed = 30
        "#;
        let config: LinecraftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_font, "cursive");
        assert_eq!(config.offset_x, 2.5);
        assert_eq!(config.offset_y, 0.0);
        assert_eq!(config.plotter.pendown_speed, 30);
        assert_eq!(config.plotter.penup_speed, 75);
        assert_eq!(config.font_dir, PathBuf::from("font_library"));
    }

    #[test]
    fn settings_mirror_plotter_table() {
        let settings = PlotterConfig::default().settings();
        assert_eq!(settings.pendown_speed, 25);
        assert_eq!(settings.pen_raise_rate, 50);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LinecraftConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.plotter.pen_lower_rate, 50);
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "offset_x = \"left\"").unwrap();
        assert!(LinecraftConfig::load_from(&path).is_err());
    }
}
