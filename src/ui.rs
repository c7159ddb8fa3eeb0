//! Terminal output: spinners and coloured status lines.
//!
//! Uses `indicatif` for the plotting spinner and `console` for colour.

use std::collections::BTreeMap;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::BatchReport;
use crate::glyph::FontInfo;
use crate::inventory::Reservoir;
use crate::orchestrator::{ControlOutcome, StatusReport};
use crate::state_machine::RunState;

/// Spinner shown while a card is on the plotter.
pub struct PlotProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl PlotProgress {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Clears the spinner and prints where the queue ended up.
    pub fn finish(&self, status: &StatusReport) {
        self.pb.finish_and_clear();
        let mark = match status.state {
            RunState::Error => self.red.apply_to("✗"),
            RunState::Paused | RunState::WaitingForPaper => self.yellow.apply_to("↻"),
            _ => self.green.apply_to("✓"),
        };
        println!("  {mark} {}", status.message);
    }
}

fn state_style(state: RunState) -> Style {
    match state {
        RunState::Idle => Style::new().cyan(),
        RunState::Plotting => Style::new().blue().bold(),
        RunState::WaitingForPaper | RunState::Paused => Style::new().yellow().bold(),
        RunState::Completed => Style::new().green().bold(),
        RunState::Error => Style::new().red().bold(),
    }
}

/// `"12.50m / 200.00m (6%)"`.
pub fn pen_usage(used: f64, capacity: f64) -> String {
    let percent = if capacity > 0.0 {
        (used / capacity * 100.0).round()
    } else {
        0.0
    };
    format!("{used:.2}m / {capacity:.2}m ({percent}%)")
}

pub fn print_outcome(outcome: &ControlOutcome) {
    if outcome.success {
        println!("  {} {}", Style::new().green().apply_to("✓"), outcome.message);
    } else {
        println!("  {} {}", Style::new().red().apply_to("✗"), outcome.message);
    }
}

/// A yellow warning line for the operator.
pub fn print_notice(message: &str) {
    println!("  {} {message}", Style::new().yellow().bold().apply_to("!"));
}

pub fn print_status(status: &StatusReport) {
    let dim = Style::new().dim();
    println!();
    println!(
        "{} {}",
        state_style(status.state).apply_to(status.state),
        dim.apply_to(format!("card {}/{}", status.position, status.total))
    );
    println!("  {}", status.message);
    if let Some(file) = &status.current_file {
        println!("  current: {file}");
    }
    if let Some(file) = &status.next_file {
        println!("  {}", dim.apply_to(format!("next:    {file}")));
    }
    println!(
        "  elapsed: {}  session ink: {:.2}m",
        status.elapsed, status.session_ink_m
    );
    match &status.pen {
        Some(pen) => println!(
            "  pen: {} {}, {:.2}m left",
            pen.name,
            pen_usage(pen.used, pen.capacity),
            pen.remaining
        ),
        None => println!("  {}", Style::new().yellow().apply_to("no active pen")),
    }
}

pub fn print_batch_report(report: &BatchReport) {
    let total: f64 = report.stats.values().sum();
    println!(
        "  {} Generated {} cards in {} ({total:.2}m of ink)",
        Style::new().green().bold().apply_to("✓"),
        report.count,
        report.output_dir.display()
    );
}

pub fn print_fonts(fonts: &[FontInfo]) {
    if fonts.is_empty() {
        println!("  {}", Style::new().yellow().apply_to("no fonts found"));
        return;
    }
    for font in fonts {
        println!("  {:<24} {}", font.name, Style::new().dim().apply_to(font.kind));
    }
}

pub fn print_pens(active: Option<&str>, pens: &BTreeMap<String, Reservoir>) {
    let bold = Style::new().bold();
    for (id, pen) in pens {
        let marker = if active == Some(id.as_str()) { "*" } else { " " };
        println!(
            "{marker} {} {:<28} {}, {:.2}m left",
            bold.apply_to(id),
            pen.name,
            pen_usage(pen.used, pen.capacity),
            pen.remaining()
        );
    }
}
