//! waif - workflow assistant
//!
//! Main entry point for the waif CLI and its OODA job scheduler.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod cmd_ooda;
mod signal;
mod watcher;

use cli::{Cli, Commands};
use cmd_ooda::handle_ooda_command;

/// Get the waif home directory (~/.waif).
fn waif_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".waif"))
        .unwrap_or_else(|| PathBuf::from(".waif"))
}

/// Initialize tracing with console and file output.
///
/// Console output goes to stderr so command output on stdout stays clean.
/// Log files are written to ~/.waif/logs/ with daily rotation. When that
/// directory cannot be created only the console layer is installed.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let log_dir = waif_dir().join("logs");
    let file_appender = std::fs::create_dir_all(&log_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("waif")
                .filename_suffix("log")
                .max_log_files(14)
                .build(&log_dir)
                .map_err(|e| e.to_string())
        });

    match file_appender {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            // Keep the worker alive for the program duration.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .init();
            tracing::warn!("File logging disabled ({}): {}", log_dir.display(), e);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Ooda { action } => handle_ooda_command(action).await,
    };

    finish(result)
}

/// Map a handler outcome to the process exit code. Errors are reported
/// once, through tracing on stderr.
fn finish(result: Result<ExitCode, Box<dyn std::error::Error>>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
