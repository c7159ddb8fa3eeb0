//! Command-line interface built on clap.
//!
//! [`Cli`] carries the subcommands ([`Command`]) and the global flags
//! (`--config`, `--verbose`, `--log-json`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::device::ManualCommand;

/// Linecraft: handwritten-style batch generation and pen-plotter queue.
#[derive(Debug, Parser)]
#[command(name = "linecraft", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emits logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compiles one SVG per CSV row into the project's batch folder.
    Generate {
        /// Project directory holding input.csv and template.svg.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Font name; defaults to the configured font.
        #[arg(long)]
        font: Option<String>,

        /// Body template with {FIELD} placeholders.
        #[arg(long)]
        body: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        offset_x: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        offset_y: Option<f64>,

        /// Seed for glyph variant selection; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Lists the fonts found in the font library.
    Fonts,

    /// Manages the pen inventory.
    Pens {
        #[command(subcommand)]
        action: PenCommand,
    },

    /// Plots a generated batch interactively.
    Plot {
        /// Project directory; its batch folder is loaded unless a session
        /// is recovered.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum PenCommand {
    /// Shows every pen and its usage.
    List,

    /// Registers a pen and makes it active.
    Add {
        name: String,

        /// Capacity in meters of line.
        #[arg(long, default_value_t = 200.0)]
        capacity: f64,
    },

    /// Makes an existing pen active.
    Select { id: String },
}

/// One line typed at the `plot` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotCommand {
    Start,
    Continue,
    Pause,
    Next,
    Previous,
    /// Pen and motor moves for paper changes.
    Manual(ManualCommand),
    Status,
    Help,
    Quit,
}

impl PlotCommand {
    pub const HELP: &'static str =
        "commands: start, continue (c or Enter), pause (p), next (n), prev (b), up, down, off, status (s), help, quit (q)";

    /// Parses a prompt line; `None` for anything unrecognised.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" | "go" => Some(Self::Start),
            "continue" | "c" | "" => Some(Self::Continue),
            "pause" | "resume" | "p" => Some(Self::Pause),
            "next" | "n" => Some(Self::Next),
            "prev" | "previous" | "b" => Some(Self::Previous),
            "up" | "pen up" => Some(Self::Manual(ManualCommand::PenUp)),
            "down" | "pen down" => Some(Self::Manual(ManualCommand::PenDown)),
            "off" | "motors off" => Some(Self::Manual(ManualCommand::MotorsOff)),
            "status" | "s" => Some(Self::Status),
            "help" | "h" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}
