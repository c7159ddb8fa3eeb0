use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use linecraft::batch::{BatchGenerator, OUTPUT_DIR, ProjectInputs};
use linecraft::cli::{Cli, Command, PenCommand, PlotCommand};
use linecraft::config::LinecraftConfig;
use linecraft::device::AxiCli;
use linecraft::glyph::FontRegistry;
use linecraft::inventory::ConsumableInventory;
use linecraft::logging::{LogFormat, init_logging};
use linecraft::orchestrator::{JobOrchestrator, Recovery};
use linecraft::session::SessionStore;
use linecraft::template::LayoutOffset;
use linecraft::ui;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_logging(format, cli.verbose);

    let config = match &cli.config {
        Some(path) => LinecraftConfig::load_from(path)?,
        None => LinecraftConfig::load()?,
    };

    match cli.command {
        Command::Generate {
            project,
            font,
            body,
            offset_x,
            offset_y,
            seed,
        } => {
            let mut inputs = ProjectInputs::new(
                project,
                font.unwrap_or_else(|| config.default_font.clone()),
            );
            inputs.body_template = body.or_else(|| config.body_template.clone());
            inputs.offset = LayoutOffset {
                x: offset_x.unwrap_or(config.offset_x),
                y: offset_y.unwrap_or(config.offset_y),
            };
            generate(&config, &inputs, seed)?;
        }
        Command::Fonts => {
            let registry = FontRegistry::load_dir(&config.font_dir)?;
            ui::print_fonts(&registry.list());
        }
        Command::Pens { action } => pens(&config, action)?,
        Command::Plot { project } => plot(&config, &project).await?,
    }

    Ok(())
}

fn generate(config: &LinecraftConfig, inputs: &ProjectInputs, seed: Option<u64>) -> Result<()> {
    let registry = FontRegistry::load_dir(&config.font_dir)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let report = BatchGenerator::new(&registry)
        .generate(inputs, &mut rng)
        .with_context(|| format!("batch generation failed in {}", inputs.project_dir.display()))?;
    ui::print_batch_report(&report);
    Ok(())
}

fn pens(config: &LinecraftConfig, action: PenCommand) -> Result<()> {
    let mut inventory = ConsumableInventory::open(&config.inventory_file)?;
    match action {
        PenCommand::List => {}
        PenCommand::Add { name, capacity } => {
            let id = inventory.add_reservoir(&name, capacity)?;
            println!("Added pen {id}");
        }
        PenCommand::Select { id } => {
            if !inventory.set_active(&id)? {
                anyhow::bail!("no pen with id {id}");
            }
        }
    }
    ui::print_pens(inventory.active_id(), inventory.reservoirs());
    Ok(())
}

async fn plot(config: &LinecraftConfig, project: &Path) -> Result<()> {
    let inventory = ConsumableInventory::open(&config.inventory_file)?;
    let device = Arc::new(AxiCli::new(
        &config.plotter.axicli_path,
        config.plotter.config_file.clone(),
    ));
    let orch = JobOrchestrator::new(
        device,
        config.plotter.settings(),
        inventory,
        SessionStore::new(&config.session_file),
    )?;

    let batch_dir: PathBuf = project.join(OUTPUT_DIR);
    match orch.recover_for(&batch_dir) {
        Recovery::Restored { current_index } => {
            info!(current_index, "resuming previous session");
        }
        Recovery::OtherQueue { recorded } => {
            ui::print_notice(&format!(
                "Previous session was for {}; loading {} instead",
                recorded.display(),
                batch_dir.display()
            ));
            ui::print_outcome(&orch.load_batch(&batch_dir));
        }
        Recovery::Fresh | Recovery::Discarded { .. } => {
            ui::print_outcome(&orch.load_batch(&batch_dir));
        }
    }
    ui::print_status(&orch.status());
    println!("{}", PlotCommand::HELP);

    let mut progress = orch.subscribe();
    let mut spinner: Option<ui::PlotProgress> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = PlotCommand::parse(&line) else {
                    println!("{}", PlotCommand::HELP);
                    continue;
                };
                let outcome = match command {
                    PlotCommand::Start => orch.start(),
                    PlotCommand::Continue => orch.continue_after_paper(),
                    PlotCommand::Pause => orch.pause_toggle(),
                    PlotCommand::Next => orch.skip_forward(),
                    PlotCommand::Previous => orch.skip_backward(),
                    PlotCommand::Manual(command) => orch.manual(command).await,
                    PlotCommand::Status => {
                        ui::print_status(&orch.status());
                        continue;
                    }
                    PlotCommand::Help => {
                        println!("{}", PlotCommand::HELP);
                        continue;
                    }
                    PlotCommand::Quit => {
                        if spinner.is_some() {
                            println!("A card is still plotting; quit once it finishes.");
                            continue;
                        }
                        break;
                    }
                };
                ui::print_outcome(&outcome);
                if outcome.success && progress.borrow().worker_busy && spinner.is_none() {
                    spinner = Some(ui::PlotProgress::start(&orch.status().message));
                }
            }
            changed = progress.changed() => {
                changed.context("orchestrator shut down")?;
                let busy = progress.borrow_and_update().worker_busy;
                if !busy {
                    if let Some(spinner) = spinner.take() {
                        spinner.finish(&orch.status());
                    }
                }
            }
        }
    }

    Ok(())
}
