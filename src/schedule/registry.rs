//! Registered scheduled jobs and their schedules.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::SchedulerError;

/// Future returned by one run of a job.
pub type JobFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A job body, invoked once per scheduled run.
pub type JobCallback = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Boxes an async closure as a [`JobCallback`].
pub fn job_callback<F, Fut>(f: F) -> JobCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || -> JobFuture { Box::pin(f()) })
}

/// When a job fires.
#[derive(Clone)]
pub enum Schedule {
    /// A cron expression with a leading seconds field.
    Cron(Box<cron::Schedule>),
    /// A fixed interval, first run one interval from now.
    Every(Duration),
}

impl Schedule {
    /// Parses either a cron expression or `@every <n>{s|m|h}`.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let expression = expression.trim();
        let invalid = |message: String| SchedulerError::InvalidSchedule {
            expression: expression.to_string(),
            message,
        };

        if let Some(interval) = expression.strip_prefix("@every") {
            let interval = parse_interval(interval.trim()).map_err(invalid)?;
            return Ok(Self::Every(interval));
        }

        cron::Schedule::from_str(expression)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// Returns the first fire time strictly after `after`, if any.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
        }
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(schedule) => write!(f, "Cron({})", schedule),
            Self::Every(interval) => write!(f, "Every({:?})", interval),
        }
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_interval(text: &str) -> Result<Duration, String> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "interval needs a unit (s, m or h)".to_string())?;
    let (amount, unit) = text.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("'{}' is not a whole number", amount))?;
    if amount == 0 {
        return Err("interval must be greater than zero".to_string());
    }

    let seconds = match unit {
        "s" => Some(amount),
        "m" => amount.checked_mul(60),
        "h" => amount.checked_mul(3600),
        other => return Err(format!("unknown interval unit '{}'", other)),
    };
    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| "interval is too large".to_string())
}

/// Lifecycle of a job with respect to error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Registered with its original callback.
    Registered,
    /// Callback replaced by an error-reporting wrapper. Never reverts.
    Wrapped,
}

/// Snapshot of one registered job.
#[derive(Clone)]
pub struct RegisteredJob {
    pub name: String,
    pub callback: JobCallback,
    pub state: JobState,
}

/// Source of registered jobs whose callbacks can be replaced in place.
pub trait JobRegistry: Send + Sync {
    /// Lists every registered job.
    fn cron_jobs(&self) -> Result<Vec<RegisteredJob>, SchedulerError>;

    /// Replaces a job's callback with its wrapped version and marks it [`JobState::Wrapped`].
    fn install_wrapped(&self, name: &str, callback: JobCallback) -> Result<(), SchedulerError>;
}

struct JobEntry {
    schedule: Arc<Schedule>,
    callback: JobCallback,
    state: JobState,
}

/// In-process job registry used by [`JobRunner`](super::runner::JobRunner).
#[derive(Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<BTreeMap<String, JobEntry>>,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job under a unique name.
    pub fn add_cron_job(
        &self,
        name: &str,
        schedule: Schedule,
        callback: JobCallback,
    ) -> Result<(), SchedulerError> {
        self.insert(name, schedule, callback, JobState::Registered)
    }

    /// Registers a job whose callback already reports its own errors.
    pub(crate) fn add_wrapped_job(
        &self,
        name: &str,
        schedule: Schedule,
        callback: JobCallback,
    ) -> Result<(), SchedulerError> {
        self.insert(name, schedule, callback, JobState::Wrapped)
    }

    fn insert(
        &self,
        name: &str,
        schedule: Schedule,
        callback: JobCallback,
        state: JobState,
    ) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(name) {
            return Err(SchedulerError::DuplicateJob {
                name: name.to_string(),
            });
        }
        jobs.insert(
            name.to_string(),
            JobEntry {
                schedule: Arc::new(schedule),
                callback,
                state,
            },
        );
        Ok(())
    }

    /// Current callback for `name`.
    pub fn callback(&self, name: &str) -> Result<JobCallback, SchedulerError> {
        self.with_entry(name, |entry| Arc::clone(&entry.callback))
    }

    pub fn schedule(&self, name: &str) -> Result<Arc<Schedule>, SchedulerError> {
        self.with_entry(name, |entry| Arc::clone(&entry.schedule))
    }

    pub fn state(&self, name: &str) -> Result<JobState, SchedulerError> {
        self.with_entry(name, |entry| entry.state)
    }

    /// Registered job names in order.
    pub fn names(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.jobs.read().map_err(poisoned)?.keys().cloned().collect())
    }

    fn with_entry<T>(
        &self,
        name: &str,
        f: impl FnOnce(&JobEntry) -> T,
    ) -> Result<T, SchedulerError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        jobs.get(name)
            .map(f)
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })
    }
}

impl JobRegistry for MemoryJobRegistry {
    fn cron_jobs(&self) -> Result<Vec<RegisteredJob>, SchedulerError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs
            .iter()
            .map(|(name, entry)| RegisteredJob {
                name: name.clone(),
                callback: Arc::clone(&entry.callback),
                state: entry.state,
            })
            .collect())
    }

    fn install_wrapped(&self, name: &str, callback: JobCallback) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let entry = jobs.get_mut(name).ok_or_else(|| SchedulerError::JobNotFound {
            name: name.to_string(),
        })?;
        entry.callback = callback;
        entry.state = JobState::Wrapped;
        Ok(())
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> SchedulerError {
    SchedulerError::RegistryUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn noop() -> JobCallback {
        job_callback(|| async { Ok::<(), anyhow::Error>(()) })
    }

    #[test]
    fn cron_expressions_fire_on_the_next_match() {
        let schedule = Schedule::parse("0 */5 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 18, 9, 31, 10).unwrap();
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 35, 0).unwrap())
        );
    }

    #[test]
    fn every_intervals_parse() {
        let after = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let schedule: Schedule = "@every 90s".parse().unwrap();
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 10, 18, 0, 1, 30).unwrap())
        );
        assert!(matches!(Schedule::parse("@every 2h"), Ok(Schedule::Every(d)) if d.as_secs() == 7200));
    }

    #[test]
    fn bad_schedules_are_rejected() {
        for bad in [
            "@every",
            "@every 0s",
            "@every 5d",
            "@every xs",
            "@every 18446744073709551615h",
            "@every 307445734561825861m",
            "not a cron",
        ] {
            assert!(
                matches!(Schedule::parse(bad), Err(SchedulerError::InvalidSchedule { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = MemoryJobRegistry::new();
        registry
            .add_cron_job("cleanup", Schedule::Every(Duration::from_secs(60)), noop())
            .unwrap();
        let err = registry
            .add_cron_job("cleanup", Schedule::Every(Duration::from_secs(5)), noop())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob { .. }));
    }

    #[test]
    fn install_wrapped_replaces_callback_and_state() {
        let registry = MemoryJobRegistry::new();
        let original = noop();
        registry
            .add_cron_job("report", Schedule::Every(Duration::from_secs(60)), Arc::clone(&original))
            .unwrap();
        assert_eq!(registry.state("report").unwrap(), JobState::Registered);

        registry.install_wrapped("report", noop()).unwrap();

        assert_eq!(registry.state("report").unwrap(), JobState::Wrapped);
        assert!(!Arc::ptr_eq(&registry.callback("report").unwrap(), &original));
        assert!(matches!(
            registry.install_wrapped("missing", noop()),
            Err(SchedulerError::JobNotFound { .. })
        ));
    }
}
