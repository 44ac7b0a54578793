//! Registering jobs with error reporting applied up front.

use std::future::Future;
use std::sync::Arc;

use super::registry::{job_callback, MemoryJobRegistry, Schedule};
use super::wrapper::JobErrorHandler;
use crate::error::SchedulerError;
use crate::notify::ErrorNotifier;

impl JobErrorHandler {
    /// Registers `job` under `name` on the schedule described by `expression`,
    /// already wrapped with this handler's error reporting.
    pub fn register<F, Fut>(
        &self,
        registry: &MemoryJobRegistry,
        name: &str,
        expression: &str,
        job: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let schedule = Schedule::parse(expression)?;
        let callback = self.wrap(name, job_callback(job));
        registry.add_wrapped_job(name, schedule, callback)
    }
}

/// Registers a job whose failures are reported to `notifier`.
///
/// With no notifier, failures are logged with a warning that the report was skipped.
/// Jobs registered this way are never wrapped again by
/// [`install_job_error_handlers`](super::wrapper::install_job_error_handlers).
pub fn register_notified_job<F, Fut>(
    registry: &MemoryJobRegistry,
    name: &str,
    expression: &str,
    notifier: Option<Arc<dyn ErrorNotifier>>,
    job: F,
) -> Result<(), SchedulerError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    JobErrorHandler::new(notifier).register(registry, name, expression, job)
}
