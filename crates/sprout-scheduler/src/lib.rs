//! `sprout-scheduler`: in-process background task scheduler on Tokio.
//!
//! # Overview
//!
//! Hosts register named, opaque task callables with a [`Scheduler`] and bind
//! them to recurrence rules. A single clock loop wakes on a fixed tick, pops
//! every due entry from a min-heap ordered by next run time, reschedules the
//! job, and hands the occurrence to a bounded worker pool. Cancellation is
//! lazy: removing or disabling a job never touches the heap; stale entries
//! are discarded when they surface.
//!
//! Outcomes land in a bounded history ring, feed per-job counters, and drive
//! [`Scheduler::health_check`]. Schedule state is in-memory only; hosts
//! rehydrate it at startup (see [`sprout_core::SproutConfig::jobs`]).
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                                 |
//! |------------|-----------------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant, then disabled     |
//! | `Interval` | Fixed-rate: next run = previous *scheduled* time + N secs |
//! | `Daily`    | Fire at HH:MM UTC every day                               |
//! | `Weekly`   | Fire at HH:MM UTC on a weekday (0 = Monday)               |

pub mod clock;
pub mod engine;
pub mod error;
mod executor;
pub mod global;
pub mod health;
pub mod history;
pub mod hooks;
pub mod index;
mod pool;
pub mod queue;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use global::{global, init_global, install_global};
pub use health::{HealthReport, HealthStatus, SchedulerStatus};
pub use hooks::{JobHook, JobStart};
pub use queue::TaskQueue;
pub use registry::Task;
pub use types::{ExportedJob, JobOptions, JobResult, ScheduledJob};

pub use sprout_core::{OverlapPolicy, Schedule, SchedulerSettings, TaskArgs, TimeOfDay};
