//! ckup - checkpointed cluster upgrade and maintenance CLI tool.
//!
//! Drives multi-step cluster operations through Salt:
//! - Upgrade to a destination version
//! - Post-deployment test suite
//! - Resume from the last completed step after a failure

mod config;
mod output;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error};

use ckup::checkpoint::{CheckpointStore, Checkpointer, Step, StepOutcome, step_status};
use ckup::salt::{MasterLocator, SaltClient};
use ckup::workflow::{self, WorkflowKind};
use config::{Args, Command, Config};
use output::print_status;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    // Initialize logging
    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting ckup {}", config::VERSION);

    if let Err(e) = run(&config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    match &config.command {
        Command::Upgrade { dest_version } => {
            let client = SaltClient::new(MasterLocator::default(), config.saltenv.clone());
            let steps = workflow::upgrade::steps(&client, dest_version);
            run_workflow(config, steps).await
        }
        Command::Test => {
            let client = SaltClient::new(MasterLocator::default(), config.saltenv.clone());
            let steps = workflow::test_suite::steps(&client);
            run_workflow(config, steps).await
        }
        Command::Status { workflow } => show_status(config, *workflow),
        Command::Reset { workflow, yes } => reset(config, *workflow, *yes),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Run the remaining steps of a workflow, one phase header per step.
async fn run_workflow(config: &Config, steps: Vec<Step<'_>>) -> Result<()> {
    let kind = config.workflow();
    let mut checkpointer = Checkpointer::new(kind.name(), steps, config.checkpoint_path())?;
    let ids = checkpointer.step_ids().to_vec();

    for (index, id) in ids.iter().enumerate() {
        print_phase(index, ids.len(), id);

        // The spinner would garble the retry prompt
        let spinner = (!config.prompt_retry).then(|| create_spinner(id));
        let result = checkpointer.run_step(id, config.prompt_retry).await;

        match (&result, spinner) {
            (Ok(StepOutcome::Skipped), Some(pb)) => {
                pb.finish_with_message(format!("{}: already completed", id))
            }
            (Ok(StepOutcome::Ran), Some(pb)) => pb.finish_with_message(format!("{}: done", id)),
            (Err(_), Some(pb)) => pb.abandon_with_message(format!("{}: failed", id)),
            (_, None) => {}
        }
        result?;
    }

    if config.destroy_on_success {
        checkpointer.destroy()?;
    }

    println!();
    println!(
        "{}",
        format!("Workflow {} completed ({} steps).", kind, ids.len())
            .green()
            .bold()
    );
    Ok(())
}

/// Prints a step header in "Phase [current/total]: name" format.
fn print_phase(index: usize, total: usize, id: &str) {
    println!();
    println!(
        "{}",
        format!("Phase [{}/{}]: {}", index + 1, total, id)
            .cyan()
            .bold()
    );
}

fn create_spinner(id: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(id.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn show_status(config: &Config, kind: WorkflowKind) -> Result<()> {
    let path = config.checkpoint_path();
    let current = CheckpointStore::new(&path).load()?;
    print_status(kind.name(), &path, &step_status(kind.step_ids(), current));
    Ok(())
}

fn reset(config: &Config, kind: WorkflowKind, yes: bool) -> Result<()> {
    let path = config.checkpoint_path();
    if !path.exists() {
        println!("No checkpoint for {} at {}.", kind, path.display());
        return Ok(());
    }

    if !yes
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete {}? The {} workflow will start over from the first step",
                path.display(),
                kind
            ))
            .default(false)
            .interact()?
    {
        println!("{}", "Reset cancelled.".yellow());
        return Ok(());
    }

    CheckpointStore::new(&path).destroy()?;
    println!("{} Removed checkpoint {}", "✓".green(), path.display());
    Ok(())
}
