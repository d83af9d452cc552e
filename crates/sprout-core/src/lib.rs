//! `sprout-core`: schedule vocabulary and configuration shared by the
//! scheduler engine and the host binary.

pub mod config;
pub mod error;
pub mod types;

pub use config::{HealthThresholds, JobSpec, SchedulerSettings, SproutConfig};
pub use error::{CoreError, Result};
pub use types::{OverlapPolicy, Schedule, TaskArgs, TimeOfDay};
