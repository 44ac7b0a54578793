//! Configuration loading, validation, and startup resolution.

pub mod loader;
pub mod model;
pub mod source;
pub mod validation;

pub use model::NotificationConfig;
pub use source::{OptionsFactory, OptionsSource};
