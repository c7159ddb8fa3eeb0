//! The external plotter, reached through a blocking command.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DeviceError;

/// Motion settings passed to the plotter for every job. Values are 1-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotterSettings {
    pub pendown_speed: u32,
    pub penup_speed: u32,
    pub acceleration: u32,
    pub pen_lower_rate: u32,
    pub pen_raise_rate: u32,
}

impl Default for PlotterSettings {
    fn default() -> Self {
        Self {
            pendown_speed: 25,
            penup_speed: 75,
            acceleration: 50,
            pen_lower_rate: 50,
            pen_raise_rate: 50,
        }
    }
}

/// A single physical plotter. Both calls block until the device is done.
pub trait PlotDevice: Send + Sync + 'static {
    fn plot(&self, document: &Path, settings: &PlotterSettings) -> Result<(), DeviceError>;

    /// Releases the steppers so paper can be changed by hand.
    fn disable_motors(&self) -> Result<(), DeviceError>;

    fn raise_pen(&self) -> Result<(), DeviceError>;

    fn lower_pen(&self) -> Result<(), DeviceError>;
}

/// Operator-driven device actions outside a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCommand {
    PenUp,
    PenDown,
    MotorsOff,
}

impl fmt::Display for ManualCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualCommand::PenUp => write!(f, "pen up"),
            ManualCommand::PenDown => write!(f, "pen down"),
            ManualCommand::MotorsOff => write!(f, "motors off"),
        }
    }
}

/// Runs a manual command. Pen moves are followed by releasing the motors,
/// whatever their outcome.
pub fn run_manual(device: &dyn PlotDevice, command: ManualCommand) -> Result<(), DeviceError> {
    let result = match command {
        ManualCommand::PenUp => device.raise_pen(),
        ManualCommand::PenDown => device.lower_pen(),
        ManualCommand::MotorsOff => return device.disable_motors(),
    };
    if let Err(e) = device.disable_motors() {
        warn!(error = %e, %command, "failed to disable motors after pen move");
    }
    result
}

/// Runs `plot` followed by `disable_motors`, whatever the plot outcome.
pub fn plot_and_release(
    device: &dyn PlotDevice,
    document: &Path,
    settings: &PlotterSettings,
) -> Result<(), DeviceError> {
    let result = device.plot(document, settings);
    if let Err(e) = device.disable_motors() {
        warn!(error = %e, "failed to disable motors after plot");
    }
    result
}

/// Drives an AxiDraw through the `axicli` executable.
#[derive(Debug, Clone)]
pub struct AxiCli {
    program: PathBuf,
    config_file: Option<PathBuf>,
}

impl AxiCli {
    pub fn new(program: impl Into<PathBuf>, config_file: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_file,
        }
    }

    /// Arguments for plotting `document`. A config file, when present,
    /// replaces the individual speed flags.
    pub fn plot_args(&self, document: &Path, settings: &PlotterSettings) -> Vec<String> {
        let mut args = vec![document.display().to_string()];
        match &self.config_file {
            Some(config) if config.is_file() => {
                args.push("--config".into());
                args.push(config.display().to_string());
            }
            _ => {
                for (flag, value) in [
                    ("--speed_pendown", settings.pendown_speed),
                    ("--speed_penup", settings.penup_speed),
                    ("--accel", settings.acceleration),
                    ("--pen_rate_lower", settings.pen_lower_rate),
                    ("--pen_rate_raise", settings.pen_raise_rate),
                ] {
                    args.push(flag.into());
                    args.push(value.to_string());
                }
            }
        }
        args
    }

    /// `--mode manual --manual_cmd <cmd>`.
    pub fn manual_args(cmd: &str) -> Vec<String> {
        ["--mode", "manual", "--manual_cmd", cmd]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn run(&self, args: &[String]) -> Result<(), DeviceError> {
        let program = self.program.display().to_string();
        debug!(%program, ?args, "invoking plotter");
        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| DeviceError::Launch {
                program: program.clone(),
                reason: e.to_string(),
            })?;
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(DeviceError::Exit { program, code }),
            None => Err(DeviceError::Killed { program }),
        }
    }
}

impl PlotDevice for AxiCli {
    fn plot(&self, document: &Path, settings: &PlotterSettings) -> Result<(), DeviceError> {
        self.run(&self.plot_args(document, settings))
    }

    fn disable_motors(&self) -> Result<(), DeviceError> {
        self.run(&Self::manual_args("disable_xy"))
    }

    fn raise_pen(&self) -> Result<(), DeviceError> {
        self.run(&Self::manual_args("raise_pen"))
    }

    fn lower_pen(&self) -> Result<(), DeviceError> {
        self.run(&Self::manual_args("lower_pen"))
    }
}
