use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{OverlapPolicy, Schedule, TaskArgs};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_HISTORY_SIZE: usize = 500;
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HEALTH_WINDOW: usize = 50;
pub const DEFAULT_DEGRADED_FAILURE_RATE: f64 = 0.2;
pub const DEFAULT_UNHEALTHY_FAILURE_RATE: f64 = 0.5;
pub const DEFAULT_STALE_FACTOR: f64 = 3.0;

/// Top-level config (sprout.toml + SPROUT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SproutConfig {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Jobs installed at startup. Schedule state is in-memory only, so this
    /// list is how the host rehydrates its default schedule after a restart.
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// Tuning knobs for the scheduling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Clock loop cadence.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on concurrently executing task bodies.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Capacity of the completed-result ring buffer.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Pause after a failed clock-loop tick before the next attempt.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// How long a graceful stop waits for queued and in-flight work.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub health: HealthThresholds,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_workers: DEFAULT_MAX_WORKERS,
            history_size: DEFAULT_HISTORY_SIZE,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            health: HealthThresholds::default(),
        }
    }
}

/// Failure-rate and staleness limits used by the health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Number of most recent results the failure rate is computed over.
    #[serde(default = "default_health_window")]
    pub window: usize,
    /// Failure rate strictly above this marks the scheduler degraded.
    #[serde(default = "default_degraded_failure_rate")]
    pub degraded_failure_rate: f64,
    /// Failure rate strictly above this marks the scheduler unhealthy.
    #[serde(default = "default_unhealthy_failure_rate")]
    pub unhealthy_failure_rate: f64,
    /// An interval job is stale once its last run is older than this many periods.
    ///
    /// Measured from the start of the last run, not from the missed slot: the
    /// next slot is already one period after that run, so with the default of
    /// 3 a job is flagged once it is about 2 periods overdue.
    #[serde(default = "default_stale_factor")]
    pub stale_factor: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            window: DEFAULT_HEALTH_WINDOW,
            degraded_failure_rate: DEFAULT_DEGRADED_FAILURE_RATE,
            unhealthy_failure_rate: DEFAULT_UNHEALTHY_FAILURE_RATE,
            stale_factor: DEFAULT_STALE_FACTOR,
        }
    }
}

/// Declarative description of one job, as written in sprout.toml:
///
/// ```toml
/// [[jobs]]
/// id = "soil-moisture"
/// task = "sensors.poll_soil"
/// schedule = { kind = "interval", every_secs = 30 }
/// args = { kwargs = { zone = "bed-1" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Stable job id. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub task: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub args: TaskArgs,
    /// Overrides the namespace derived from the task name.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Interval jobs only: fire on the first tick instead of one period out.
    #[serde(default)]
    pub start_immediately: bool,
    /// Advisory execution budget; overruns are logged, never preempted.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl JobSpec {
    pub fn new(task: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            id: None,
            task: task.into(),
            schedule,
            args: TaskArgs::default(),
            namespace: None,
            enabled: true,
            start_immediately: false,
            timeout_secs: None,
            overlap: OverlapPolicy::Allow,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}
fn default_error_backoff_ms() -> u64 {
    DEFAULT_ERROR_BACKOFF_MS
}
fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}
fn default_health_window() -> usize {
    DEFAULT_HEALTH_WINDOW
}
fn default_degraded_failure_rate() -> f64 {
    DEFAULT_DEGRADED_FAILURE_RATE
}
fn default_unhealthy_failure_rate() -> f64 {
    DEFAULT_UNHEALTHY_FAILURE_RATE
}
fn default_stale_factor() -> f64 {
    DEFAULT_STALE_FACTOR
}

impl SproutConfig {
    /// Load config from a TOML file with SPROUT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument (must exist)
    ///   2. ~/.sprout/sprout.toml (optional; defaults apply when missing)
    ///
    /// Nested keys use a double underscore in env vars, e.g.
    /// `SPROUT_SCHEDULER__MAX_WORKERS=2`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = match config_path {
            Some(p) => {
                std::fs::metadata(p)?;
                p.to_string()
            }
            None => default_config_path(),
        };
        debug!(path = %path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("SPROUT_").split("__")),
        )
    }

    /// Extract and validate from an already-assembled provider stack.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        let config: SproutConfig = figment
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CoreError;

        let s = &self.scheduler;
        if s.max_workers == 0 {
            return Err(CoreError::Config("scheduler.max_workers must be at least 1".into()));
        }
        if s.tick_interval_ms == 0 {
            return Err(CoreError::Config("scheduler.tick_interval_ms must be positive".into()));
        }
        let h = &s.health;
        if !(0.0..=1.0).contains(&h.degraded_failure_rate)
            || !(0.0..=1.0).contains(&h.unhealthy_failure_rate)
        {
            return Err(CoreError::Config("health failure rates must lie in [0, 1]".into()));
        }
        if h.degraded_failure_rate > h.unhealthy_failure_rate {
            return Err(CoreError::Config(
                "health.degraded_failure_rate must not exceed unhealthy_failure_rate".into(),
            ));
        }
        for job in &self.jobs {
            job.schedule
                .validate()
                .map_err(|e| CoreError::Config(format!("job '{}': {e}", job.task)))?;
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sprout/sprout.toml", home)
}
