//! Job configuration hot reload.
//!
//! Watches the configuration file's directory (editors often replace the
//! file instead of writing it in place), debounces bursts of events and
//! reloads. Only configurations that validate are handed on; an invalid
//! edit is logged and the running schedule is kept.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use waif_config::{ConfigLoader, JobsConfig};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches a configuration file and yields each valid new version.
pub(crate) struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    reloads: mpsc::Receiver<JobsConfig>,
}

impl ConfigWatcher {
    /// Start watching `path`.
    pub(crate) fn spawn(path: &Path) -> Result<Self, notify::Error> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|name| name.to_os_string());

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let (reload_tx, reloads) = mpsc::channel::<JobsConfig>(1);

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    let _ = event_tx.blocking_send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Watching job configuration for changes: {}", path.display());

        let path = path.to_path_buf();
        tokio::spawn(async move {
            let mut pending: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            if is_relevant(&event, file_name.as_ref()) {
                                debug!("Job configuration change detected: {:?}", event.paths);
                                pending = Some(tokio::time::Instant::now());
                            }
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        let Some(since) = pending else { continue };
                        if since.elapsed() < DEBOUNCE {
                            continue;
                        }
                        pending = None;

                        if let Some(config) = reload(&path) {
                            if reload_tx.send(config).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            debug!("Job configuration watcher stopped");
        });

        Ok(Self {
            _watcher: watcher,
            reloads,
        })
    }

    /// Next valid configuration. `None` once the watcher has stopped.
    pub(crate) async fn next(&mut self) -> Option<JobsConfig> {
        self.reloads.recv().await
    }
}

fn is_relevant(event: &Event, file_name: Option<&OsString>) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    match file_name {
        Some(name) => event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(name.as_os_str())),
        None => true,
    }
}

fn reload(path: &Path) -> Option<JobsConfig> {
    match ConfigLoader::load(path) {
        Ok(config) => {
            info!(
                "Job configuration reloaded: {} job(s) from {}",
                config.jobs.len(),
                path.display()
            );
            Some(config)
        }
        Err(e) => {
            error!("Job configuration reload rejected, keeping current schedule: {}", e);
            None
        }
    }
}
