//! `waif ooda` subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use waif_config::{ConfigLoader, JobDefinition, JobsConfig};
use waif_cron::{previous_fire_time, upcoming};
use waif_runner::{JobRecorder, JobRunResult, JobRunner, JobStatus, LogTarget, SnapshotOptions};
use waif_scheduler::{Scheduler, SchedulerConfig};

use crate::cli::{ConfigArgs, LogArgs, OodaAction};
use crate::signal::shutdown_signal;
use crate::watcher::ConfigWatcher;

/// Job failed.
const EXIT_FAILURE: u8 = 1;
/// Configuration could not be loaded, or the job id is unknown.
const EXIT_CONFIG: u8 = 2;
/// Job timed out.
const EXIT_TIMEOUT: u8 = 124;

/// How long shutdown waits for runs that are still in flight.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Handle ooda subcommands.
pub(crate) async fn handle_ooda_command(
    action: OodaAction,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match action {
        OodaAction::RunJob { config, job, log } => run_job(&config, &job, &log).await,
        OodaAction::Scheduler {
            config,
            log,
            interval_ms,
            watch,
        } => run_scheduler(&config, &log, Duration::from_millis(interval_ms), watch).await,
        OodaAction::Validate { config } => Ok(validate(&config)),
        OodaAction::Next { config, job, count } => Ok(next(&config, job.as_deref(), count)),
    }
}

/// Load the configuration, printing every problem on failure.
fn load(args: &ConfigArgs) -> Result<(PathBuf, JobsConfig), ExitCode> {
    let path = ConfigLoader::resolve_path(args.config.as_deref());
    match ConfigLoader::load(&path) {
        Ok(config) => Ok((path, config)),
        Err(e) => {
            eprintln!("{}", e);
            Err(ExitCode::from(EXIT_CONFIG))
        }
    }
}

fn log_target(args: &LogArgs) -> LogTarget {
    match (&args.log, &args.log_dir) {
        (Some(path), _) => LogTarget::Shared(path.clone()),
        (None, Some(dir)) => LogTarget::PerJob { dir: dir.clone() },
        (None, None) => LogTarget::default(),
    }
}

fn recorder(args: &LogArgs) -> JobRecorder {
    JobRecorder::new(
        JobRunner::default(),
        log_target(args),
        SnapshotOptions::default().with_redact_command(args.redact_command),
    )
}

fn exit_code_for(result: &JobRunResult) -> ExitCode {
    match result.status {
        JobStatus::Success => ExitCode::SUCCESS,
        JobStatus::Failure => ExitCode::from(EXIT_FAILURE),
        JobStatus::Timeout => ExitCode::from(EXIT_TIMEOUT),
    }
}

/// Run one job now.
async fn run_job(
    config_args: &ConfigArgs,
    job_id: &str,
    log_args: &LogArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (path, config) = match load(config_args) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };

    let Some(job) = config.job(job_id) else {
        eprintln!(
            "Unknown job id '{}' in {} (available: {})",
            job_id,
            path.display(),
            config.job_ids().join(", ")
        );
        return Ok(ExitCode::from(EXIT_CONFIG));
    };

    let recorder = recorder(log_args);
    let result = recorder.run(job).await;

    let exit_code = result
        .exit_code
        .map_or_else(|| "null".to_string(), |code| code.to_string());
    println!(
        "{}: {} (exit_code={}, duration_ms={}) -> {}",
        job.id,
        result.status,
        exit_code,
        result.duration_ms,
        recorder.target().path_for(&job.id).display()
    );
    if let Some(err) = &result.spawn_error {
        eprintln!("{}: failed to start: {}", job.id, err);
    }

    Ok(exit_code_for(&result))
}

/// Build and start a scheduler whose due jobs are run and recorded.
fn start_scheduler(
    jobs: Vec<JobDefinition>,
    interval: Duration,
    recorder: &JobRecorder,
    tasks: &TaskTracker,
) -> Result<Scheduler, Box<dyn std::error::Error>> {
    let scheduler = Scheduler::new(jobs, SchedulerConfig::default().with_tick_interval(interval));

    let recorder = recorder.clone();
    let tasks = tasks.clone();
    scheduler.on_run(move |job| {
        let recorder = recorder.clone();
        let job = job.clone();
        tasks.spawn(async move {
            recorder.run(&job).await;
        });
        Ok(())
    });

    scheduler.start()?;
    Ok(scheduler)
}

/// Run the scheduler until SIGINT/SIGTERM.
async fn run_scheduler(
    config_args: &ConfigArgs,
    log_args: &LogArgs,
    interval: Duration,
    watch: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (path, config) = match load(config_args) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };

    let recorder = recorder(log_args);
    let tasks = TaskTracker::new();
    let mut scheduler = start_scheduler(config.jobs, interval, &recorder, &tasks)?;

    let mut watcher = if watch {
        Some(ConfigWatcher::spawn(&path)?)
    } else {
        None
    };

    info!("OODA scheduler running from {} (Ctrl-C to stop)", path.display());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(config) = next_reload(&mut watcher) => {
                scheduler.dispose();
                scheduler = start_scheduler(config.jobs, interval, &recorder, &tasks)?;
            }
        }
    }

    scheduler.dispose();
    tasks.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tasks.wait()).await.is_err() {
        warn!(
            "{} job run(s) still in flight after {:?}; exiting anyway",
            tasks.len(),
            SHUTDOWN_GRACE
        );
    }

    info!("OODA scheduler stopped");
    Ok(ExitCode::SUCCESS)
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<JobsConfig> {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

/// Validate the configuration and report the outcome.
fn validate(args: &ConfigArgs) -> ExitCode {
    match load(args) {
        Ok((path, config)) => {
            println!("OK: {} job(s) in {}", config.jobs.len(), path.display());
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

/// Print previous and upcoming fire times.
fn next(args: &ConfigArgs, job_id: Option<&str>, count: usize) -> ExitCode {
    let (path, config) = match load(args) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let jobs: Vec<&JobDefinition> = match job_id {
        Some(id) => match config.job(id) {
            Some(job) => vec![job],
            None => {
                eprintln!("Unknown job id '{}' in {}", id, path.display());
                return ExitCode::from(EXIT_CONFIG);
            }
        },
        None => config.jobs.iter().collect(),
    };

    let now = Local::now();
    for job in jobs {
        print!("{}", describe_fire_times(job, &now, count));
    }
    ExitCode::SUCCESS
}

fn describe_fire_times(job: &JobDefinition, now: &DateTime<Local>, count: usize) -> String {
    let mut out = format!("{} ({}) [{}]\n", job.id, job.name, job.schedule);

    let previous = previous_fire_time(&job.schedule, now)
        .map(|t| format_time(&t))
        .unwrap_or_else(|_| "-".to_string());
    out.push_str(&format!("  previous: {}\n", previous));

    match upcoming(&job.schedule, now, count) {
        Ok(times) => {
            for t in times {
                out.push_str(&format!("  next:     {}\n", format_time(&t)));
            }
        }
        Err(e) => out.push_str(&format!("  error:    {}\n", e)),
    }
    out
}

fn format_time(t: &DateTime<Local>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}
