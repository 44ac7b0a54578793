//! Runs registered jobs on their schedules.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::{MemoryJobRegistry, Schedule};
use crate::error::SchedulerError;
use crate::notify::CapturedError;

/// Fires every job in a [`MemoryJobRegistry`] on its schedule.
///
/// Each run looks up the job's current callback, so wrapping installed after
/// [`JobRunner::start`] still applies. A failing or panicking job is logged and
/// does not stop its later runs.
pub struct JobRunner {
    registry: Arc<MemoryJobRegistry>,
    handles: Vec<JoinHandle<()>>,
}

impl JobRunner {
    pub fn new(registry: Arc<MemoryJobRegistry>) -> Self {
        Self {
            registry,
            handles: Vec::new(),
        }
    }

    /// Spawns one task per registered job. Returns the number of jobs started.
    pub fn start(&mut self) -> Result<usize, SchedulerError> {
        let names = self.registry.names()?;

        for name in &names {
            let schedule = self.registry.schedule(name)?;
            let registry = Arc::clone(&self.registry);
            let name = name.clone();
            self.handles
                .push(tokio::spawn(run_job_loop(registry, name, schedule)));
        }

        info!(count = names.len(), "Job runner started");
        Ok(names.len())
    }

    /// Runs a job once right now, returning whatever its callback returns.
    pub async fn run_now(&self, name: &str) -> anyhow::Result<()> {
        let callback = self.registry.callback(name)?;
        callback().await
    }

    /// Stops all scheduled runs.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Job runner stopped");
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Picks the next fire time and how long to sleep until it.
///
/// Never returns a time at or before `previous`, even when the timer woke
/// slightly ahead of the wall clock.
fn next_fire(
    schedule: &Schedule,
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> Option<(DateTime<Utc>, Duration)> {
    let anchor = previous.map_or(now, |previous| previous.max(now));
    let next = schedule.next_after(anchor)?;
    let wait = (next - anchor).to_std().unwrap_or_default();
    Some((next, wait))
}

async fn run_job_loop(registry: Arc<MemoryJobRegistry>, name: String, schedule: Arc<Schedule>) {
    let mut previous = None;
    loop {
        let Some((next, wait)) = next_fire(&schedule, Utc::now(), previous) else {
            info!(job = %name, "Job has no further scheduled runs");
            return;
        };
        previous = Some(next);
        tokio::time::sleep(wait).await;

        let callback = match registry.callback(&name) {
            Ok(callback) => callback,
            Err(e) => {
                warn!(job = %name, error = %e, "Job disappeared from registry");
                return;
            }
        };

        debug!(job = %name, "Running scheduled job");
        match AssertUnwindSafe(async move { callback().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                error!(job = %name, error = %message, "Scheduled job failed")
            }
            Err(panic) => {
                let panic = CapturedError::from_panic(panic);
                error!(job = %name, error = %panic, "Scheduled job panicked")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::intercept::tests::RecordingNotifier;
    use crate::schedule::registry::job_callback;
    use crate::schedule::wrapper::install_job_error_handlers;

    #[tokio::test(start_paused = true)]
    async fn failing_jobs_keep_running_and_get_reported() {
        let registry = Arc::new(MemoryJobRegistry::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        registry
            .add_cron_job(
                "heartbeat",
                Schedule::Every(Duration::from_secs(1)),
                job_callback(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(anyhow::anyhow!("still broken"))
                    }
                }),
            )
            .unwrap();

        let mut runner = JobRunner::new(Arc::clone(&registry));
        assert_eq!(runner.start().unwrap(), 1);

        let notifier = RecordingNotifier::delivering();
        install_job_error_handlers(registry.as_ref(), notifier.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        runner.shutdown();

        let total = runs.load(Ordering::SeqCst);
        assert!(total >= 3, "expected at least 3 runs, saw {}", total);
        assert_eq!(notifier.count(), total);
    }

    #[test]
    fn early_wakeup_does_not_repeat_a_cron_tick() {
        let schedule = Schedule::parse("0 * * * * *").unwrap();
        let fired = Utc.with_ymd_and_hms(2026, 10, 18, 9, 31, 0).unwrap();
        let woke = fired - chrono::Duration::milliseconds(2);

        let (next, wait) = next_fire(&schedule, woke, Some(fired)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 18, 9, 32, 0).unwrap());
        assert_eq!(wait, Duration::from_secs(60));

        let late = fired + chrono::Duration::seconds(15);
        let (next, wait) = next_fire(&schedule, late, Some(fired)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 18, 9, 32, 0).unwrap());
        assert_eq!(wait, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn run_now_returns_the_callback_result() {
        let registry = Arc::new(MemoryJobRegistry::new());
        registry
            .add_cron_job(
                "once",
                Schedule::Every(Duration::from_secs(3600)),
                job_callback(|| async { Err::<(), _>(anyhow::anyhow!("nope")) }),
            )
            .unwrap();
        let runner = JobRunner::new(registry);

        assert!(runner.run_now("once").await.is_err());
        assert!(runner.run_now("missing").await.is_err());
    }
}
