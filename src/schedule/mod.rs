//! Scheduled jobs and error reporting around their callbacks.

pub mod register;
pub mod registry;
pub mod runner;
pub mod wrapper;

pub use register::register_notified_job;
pub use registry::{
    job_callback, JobCallback, JobRegistry, JobState, MemoryJobRegistry, RegisteredJob, Schedule,
};
pub use runner::JobRunner;
pub use wrapper::{install_job_error_handlers, JobErrorHandler};
