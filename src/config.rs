//! CLI configuration and argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ckup::workflow::WorkflowKind;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub const DEFAULT_CHECKPOINT_DIR: &str = "/var/lib/ckup/checkpoints";

/// Checkpointed cluster upgrade and maintenance tool.
///
/// Runs each workflow as an ordered list of Salt operations and records
/// progress after every completed step, so an interrupted run resumes at the
/// step that failed.
#[derive(Parser, Debug, Clone)]
#[command(name = "ckup")]
#[command(about = "Checkpointed cluster upgrade and maintenance tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding one checkpoint file per workflow
    #[arg(long, global = true, default_value = DEFAULT_CHECKPOINT_DIR, env = "CKUP_CHECKPOINT_DIR")]
    pub checkpoint_dir: PathBuf,

    /// Salt environment passed to every call
    #[arg(long, global = true, env = "CKUP_SALTENV")]
    pub saltenv: Option<String>,

    /// Ask whether to retry a failed step instead of exiting
    #[arg(long, global = true, default_value = "false")]
    pub prompt_retry: bool,

    /// Keep the checkpoint file after a successful run
    #[arg(long, global = true, default_value = "false")]
    pub keep_checkpoint: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "CKUP_LOG_LEVEL")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upgrade the cluster to a destination version
    Upgrade {
        /// Destination version (e.g., 2.1.0)
        #[arg(long = "version", value_name = "VERSION")]
        dest_version: String,
    },
    /// Run the post-deployment test suite
    Test,
    /// Show which steps of a workflow have completed
    Status {
        #[arg(value_enum)]
        workflow: WorkflowKind,
    },
    /// Delete the checkpoint of a workflow so it starts over
    Reset {
        #[arg(value_enum)]
        workflow: WorkflowKind,

        /// Skip the confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub checkpoint_dir: PathBuf,
    pub saltenv: Option<String>,
    pub prompt_retry: bool,
    pub destroy_on_success: bool,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        Self {
            command: args.command,
            checkpoint_dir: args.checkpoint_dir,
            saltenv: args.saltenv.filter(|s| !s.trim().is_empty()),
            prompt_retry: args.prompt_retry,
            destroy_on_success: !args.keep_checkpoint,
            log_level: args.log_level,
        }
    }

    /// Workflow the command operates on.
    pub fn workflow(&self) -> WorkflowKind {
        match self.command {
            Command::Upgrade { .. } => WorkflowKind::Upgrade,
            Command::Test => WorkflowKind::Test,
            Command::Status { workflow } | Command::Reset { workflow, .. } => workflow,
        }
    }

    /// Checkpoint file of the workflow the command operates on.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.workflow().checkpoint_path(&self.checkpoint_dir)
    }
}
