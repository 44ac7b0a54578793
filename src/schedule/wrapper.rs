//! Error reporting around scheduled job callbacks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use super::registry::{JobCallback, JobFuture, JobRegistry, JobState};
use crate::notify::{CapturedError, ErrorContext, ErrorNotifier, Metrics, TransportKind};

/// Wraps job callbacks so failures are logged and reported instead of
/// reaching the job runner.
#[derive(Clone, Default)]
pub struct JobErrorHandler {
    notifier: Option<Arc<dyn ErrorNotifier>>,
    metrics: Option<Arc<Metrics>>,
}

impl JobErrorHandler {
    /// Creates a handler. Without a notifier, failures are only logged.
    pub fn new(notifier: Option<Arc<dyn ErrorNotifier>>) -> Self {
        Self {
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a callback that runs `original` once per call and never fails.
    ///
    /// Errors and panics from `original` are logged and sent to the notifier.
    /// A failed or panicking notification is logged and dropped.
    pub fn wrap(&self, job_name: &str, original: JobCallback) -> JobCallback {
        let handler = self.clone();
        let job_name: Arc<str> = Arc::from(job_name);

        Arc::new(move || -> JobFuture {
            let handler = handler.clone();
            let job_name = Arc::clone(&job_name);
            let original = Arc::clone(&original);

            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { original().await })
                    .catch_unwind()
                    .await;

                let captured = match outcome {
                    Ok(Ok(())) => return Ok(()),
                    Ok(Err(e)) => CapturedError::from_anyhow(&e),
                    Err(panic) => CapturedError::from_panic(panic),
                };

                handler.report(&job_name, &captured).await;
                Ok::<(), anyhow::Error>(())
            })
        })
    }

    /// Wraps every job in `registry` that is not wrapped yet.
    ///
    /// Returns the number of jobs wrapped by this call. A registry that cannot
    /// be read is logged and treated as empty so startup is never blocked.
    pub fn install(&self, registry: &dyn JobRegistry) -> usize {
        let jobs = match registry.cron_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to set up scheduled job error handling");
                return 0;
            }
        };

        let mut wrapped = 0;
        for job in jobs.into_iter().filter(|j| j.state == JobState::Registered) {
            let callback = self.wrap(&job.name, job.callback);
            match registry.install_wrapped(&job.name, callback) {
                Ok(()) => wrapped += 1,
                Err(e) => warn!(job = %job.name, error = %e, "Could not wrap scheduled job"),
            }
        }

        info!(count = wrapped, "Scheduled job error handling initialized for {} jobs", wrapped);
        wrapped
    }

    async fn report(&self, job_name: &str, captured: &CapturedError) {
        error!(job = %job_name, error = %captured, "Scheduled job \"{}\" failed", job_name);

        if let Some(metrics) = &self.metrics {
            metrics.record_captured(TransportKind::ScheduledJob);
        }

        let Some(notifier) = &self.notifier else {
            warn!(
                job = %job_name,
                "No Slack notifier available for scheduled job; skipping notification"
            );
            return;
        };

        let context = ErrorContext::scheduled_job(job_name);
        let sent = AssertUnwindSafe(notifier.send_error_notification(captured, Some(&context)))
            .catch_unwind()
            .await;

        match sent {
            Ok(true) => {}
            Ok(false) => {
                error!(job = %job_name, "Failed to send Slack notification for scheduled job")
            }
            Err(panic) => {
                let panic = CapturedError::from_panic(panic);
                error!(
                    job = %job_name,
                    error = %panic,
                    "Slack notifier panicked while reporting scheduled job failure"
                )
            }
        }
    }
}

/// Wraps every registered job in `registry` with error reporting to `notifier`.
///
/// Call once, after all jobs are registered. Later calls only wrap jobs added
/// since; jobs are never wrapped twice.
pub fn install_job_error_handlers(
    registry: &dyn JobRegistry,
    notifier: Arc<dyn ErrorNotifier>,
) -> usize {
    JobErrorHandler::new(Some(notifier)).install(registry)
}
