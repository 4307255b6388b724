//! Scheduler that tracks next fire times and signals due jobs.
//!
//! Lifecycle: `Idle` -> `Running` -> `Stopped` -> `Disposed`. `start()` may
//! be called from `Idle` or `Stopped` and is a no-op while running.
//! `stop()` and `dispose()` return only once no tick can dispatch anymore.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waif_config::JobDefinition;
use waif_cron::{next_fire_time, CronError};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// Result returned by run listeners.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type RunListener = Arc<dyn Fn(&JobDefinition) -> ListenerResult + Send + Sync>;
type DropListener = Arc<dyn Fn(&str, &CronError) + Send + Sync>;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
    Disposed,
}

struct State {
    phase: SchedulerState,
    jobs: Vec<JobDefinition>,
    next_fire: HashMap<String, DateTime<Local>>,
    cancel: Option<CancellationToken>,
    /// Bumped on every start so a stale tick loop never dispatches.
    generation: u64,
}

impl State {
    /// Recompute every job's next fire time from `from`. Jobs whose schedule
    /// does not compute are removed and returned.
    fn reschedule_all(&mut self, from: &DateTime<Local>) -> Vec<(String, CronError)> {
        self.next_fire.clear();

        let next_fire = &mut self.next_fire;
        let mut dropped = Vec::new();
        self.jobs.retain(|job| match next_fire_time(&job.schedule, from) {
            Ok(next) => {
                next_fire.insert(job.id.clone(), next);
                true
            }
            Err(e) => {
                dropped.push((job.id.clone(), e));
                false
            }
        });

        dropped
    }

    fn remove(&mut self, job_id: &str) {
        self.jobs.retain(|job| job.id != job_id);
        self.next_fire.remove(job_id);
    }
}

#[derive(Default)]
struct Listeners {
    run: Vec<RunListener>,
    drop: Vec<DropListener>,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    listeners: Mutex<Listeners>,
    /// Held while a tick dispatches. Reentrant so that listeners can call
    /// back into the scheduler (`add`, `stop`) from inside a tick.
    dispatch: ReentrantMutex<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(token) = self.state.get_mut().cancel.take() {
            token.cancel();
        }
    }
}

/// Cron scheduler.
///
/// Cheap to clone; clones share the same jobs, listeners and tick loop.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create an idle scheduler over `jobs`.
    pub fn new(jobs: Vec<JobDefinition>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    phase: SchedulerState::Idle,
                    jobs,
                    next_fire: HashMap::new(),
                    cancel: None,
                    generation: 0,
                }),
                listeners: Mutex::new(Listeners::default()),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.inner.state.lock().phase
    }

    /// Number of jobs currently scheduled.
    pub fn job_count(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    /// Register a listener notified with each due job.
    ///
    /// Listener errors and panics are logged and never affect other jobs.
    pub fn on_run<F>(&self, listener: F)
    where
        F: Fn(&JobDefinition) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.listeners.lock().run.push(Arc::new(listener));
    }

    /// Register a listener notified when a job is dropped because its next
    /// fire time could not be computed.
    pub fn on_drop<F>(&self, listener: F)
    where
        F: Fn(&str, &CronError) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().drop.push(Arc::new(listener));
    }

    /// Start the tick loop.
    ///
    /// Next fire times are computed from now before this returns. Calling
    /// `start` while already running does nothing.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let (token, generation, dropped, job_count) = {
            let mut state = self.inner.state.lock();
            match state.phase {
                SchedulerState::Running => return Ok(()),
                SchedulerState::Disposed => return Err(SchedulerError::Disposed),
                SchedulerState::Idle | SchedulerState::Stopped => {}
            }

            let dropped = state.reschedule_all(&Local::now());
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            state.generation += 1;
            state.phase = SchedulerState::Running;
            (token, state.generation, dropped, state.jobs.len())
        };

        self.notify_dropped(dropped);

        let interval = self.inner.config.tick_interval;
        handle.spawn(tick_loop(
            Arc::downgrade(&self.inner),
            interval,
            generation,
            token,
        ));

        info!(
            "Scheduler started ({} job(s), tick interval: {:?})",
            job_count, interval
        );
        Ok(())
    }

    /// Stop the tick loop, keeping jobs and listeners.
    pub fn stop(&self) {
        let stopped = {
            let mut state = self.inner.state.lock();
            if state.phase == SchedulerState::Running {
                state.phase = SchedulerState::Stopped;
                if let Some(token) = state.cancel.take() {
                    token.cancel();
                }
                true
            } else {
                false
            }
        };

        // Wait out a tick still dispatching on another thread.
        drop(self.inner.dispatch.lock());

        if stopped {
            info!("Scheduler stopped");
        }
    }

    /// Stop the tick loop and clear all jobs and listeners.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.phase == SchedulerState::Disposed {
                return;
            }
            if let Some(token) = state.cancel.take() {
                token.cancel();
            }
            state.phase = SchedulerState::Disposed;
            state.jobs.clear();
            state.next_fire.clear();
        }

        drop(self.inner.dispatch.lock());
        *self.inner.listeners.lock() = Listeners::default();

        info!("Scheduler disposed");
    }

    /// Add a job.
    ///
    /// While running, the job's next fire time is computed immediately so it
    /// takes part in the next due tick. A job with the same id is replaced.
    pub fn add(&self, job: JobDefinition) -> Result<(), SchedulerError> {
        let dropped = {
            let mut state = self.inner.state.lock();
            if state.phase == SchedulerState::Disposed {
                return Err(SchedulerError::Disposed);
            }

            if state.jobs.iter().any(|j| j.id == job.id) {
                debug!(job_id = %job.id, "Replacing scheduled job");
                state.remove(&job.id);
            }

            let running = state.phase == SchedulerState::Running;
            let id = job.id.clone();
            let next = running.then(|| next_fire_time(&job.schedule, &Local::now()));
            state.jobs.push(job);

            match next {
                Some(Ok(next)) => {
                    state.next_fire.insert(id, next);
                    None
                }
                Some(Err(e)) => {
                    state.remove(&id);
                    Some((id, e))
                }
                None => None,
            }
        };

        if let Some(dropped) = dropped {
            self.notify_dropped(vec![dropped]);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn next_fire(&self, job_id: &str) -> Option<DateTime<Local>> {
        self.inner.state.lock().next_fire.get(job_id).cloned()
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.inner.state.lock();
        state.phase == SchedulerState::Running && state.generation == generation
    }

    /// One tick: notify listeners of every due job and move each due job's
    /// fire time strictly past now.
    fn tick(&self, generation: u64) {
        let _dispatch = self.inner.dispatch.lock();
        let now = Local::now();

        let (due, dropped) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.phase != SchedulerState::Running || state.generation != generation {
                return;
            }

            let due: Vec<JobDefinition> = state
                .jobs
                .iter()
                .filter(|job| state.next_fire.get(&job.id).is_some_and(|t| *t <= now))
                .cloned()
                .collect();

            let from = now + TimeDelta::milliseconds(1);
            let mut dropped = Vec::new();
            for job in &due {
                match next_fire_time(&job.schedule, &from) {
                    Ok(next) => {
                        state.next_fire.insert(job.id.clone(), next);
                    }
                    Err(e) => {
                        state.remove(&job.id);
                        dropped.push((job.id.clone(), e));
                    }
                }
            }

            (due, dropped)
        };

        for job in &due {
            // A listener may have stopped the scheduler mid-tick.
            if !self.is_current(generation) {
                break;
            }
            debug!(job_id = %job.id, "Job due");
            self.emit_run(job);
        }

        self.notify_dropped(dropped);
    }

    fn emit_run(&self, job: &JobDefinition) {
        let listeners = self.inner.listeners.lock().run.clone();
        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(job))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(job_id = %job.id, error = %e, "Run listener failed"),
                Err(_) => warn!(job_id = %job.id, "Run listener panicked"),
            }
        }
    }

    fn notify_dropped(&self, dropped: Vec<(String, CronError)>) {
        if dropped.is_empty() {
            return;
        }

        let listeners = self.inner.listeners.lock().drop.clone();
        for (job_id, error) in dropped {
            warn!(
                job_id = %job_id,
                error = %error,
                "Dropping job from scheduling: next fire time could not be computed"
            );
            for listener in &listeners {
                if panic::catch_unwind(AssertUnwindSafe(|| listener(&job_id, &error))).is_err() {
                    warn!(job_id = %job_id, "Drop listener panicked");
                }
            }
        }
    }
}

async fn tick_loop(
    inner: Weak<Inner>,
    period: Duration,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                Scheduler { inner }.tick(generation);
            }
        }
    }

    debug!("Scheduler tick loop exited (generation {})", generation);
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
