//! CLI definitions for waif.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// waif CLI.
#[derive(Parser)]
#[command(name = "waif")]
#[command(about = "Workflow assistant with a cron-driven OODA job scheduler")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// OODA job scheduler commands
    Ooda {
        #[command(subcommand)]
        action: OodaAction,
    },
}

/// Where the job configuration comes from.
#[derive(Args, Clone)]
pub(crate) struct ConfigArgs {
    /// Job configuration file (default: $WAIF_CONFIG, then .waif/ooda-scheduler.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Where snapshots are written.
#[derive(Args, Clone)]
pub(crate) struct LogArgs {
    /// Append every snapshot to this file
    #[arg(long, conflicts_with = "log_dir")]
    pub log: Option<PathBuf>,

    /// Write snapshots to <dir>/<job_id>.jsonl (default: history/)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Leave the command line out of snapshots
    #[arg(long)]
    pub redact_command: bool,
}

#[derive(Subcommand)]
pub(crate) enum OodaAction {
    /// Run one job now and record its snapshot
    RunJob {
        #[command(flatten)]
        config: ConfigArgs,

        /// Job id to run
        #[arg(short, long)]
        job: String,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Run the scheduler until interrupted
    Scheduler {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        log: LogArgs,

        /// Tick interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Reload the configuration when the file changes
        #[arg(long)]
        watch: bool,
    },

    /// Validate the job configuration
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show previous and upcoming fire times
    Next {
        #[command(flatten)]
        config: ConfigArgs,

        /// Only show this job
        #[arg(short, long)]
        job: Option<String>,

        /// Number of upcoming fire times per job
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}
