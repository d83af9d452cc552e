//! Health classification and the structural status snapshot.
//!
//! Both are computed on demand from the job store and the history ring; the
//! classification itself is a pure function so it can be tested without a
//! running scheduler.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sprout_core::{HealthThresholds, Schedule};

use crate::history::WindowStats;
use crate::types::ScheduledJob;

/// Overall scheduler health. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of [`crate::Scheduler::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub running: bool,
    /// Failure fraction over the most recent `window_size` results.
    pub failure_rate: f64,
    pub window_size: usize,
    pub recent_failures: usize,
    /// Enabled interval jobs overdue by more than the stale factor.
    pub stale_jobs: Vec<String>,
    /// Human-readable causes of a non-healthy status; empty when healthy.
    pub reasons: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Result of [`crate::Scheduler::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub total_jobs: usize,
    pub enabled_jobs: usize,
    /// Enabled jobs with a future firing, counted from the job records.
    pub pending_jobs: usize,
    pub namespaces: Vec<String>,
    pub recent_failures: usize,
    pub history_size: usize,
    pub max_workers: usize,
    pub active_workers: usize,
    pub queued_jobs: usize,
    /// Raw due-index size, stale entries included.
    pub index_entries: usize,
}

/// Ids of enabled interval jobs whose last run is older than
/// `factor` × their period. Jobs that never ran are not stale.
///
/// The age is taken from `last_run`, so a job is overdue by roughly
/// `factor - 1` periods when it is first reported.
pub(crate) fn stale_jobs<'a>(
    jobs: impl Iterator<Item = &'a ScheduledJob>,
    factor: f64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut stale: Vec<String> = jobs
        .filter(|job| job.enabled)
        .filter_map(|job| {
            let Schedule::Interval { every_secs } = job.schedule else {
                return None;
            };
            let last_run = job.last_run?;
            let limit_ms = (every_secs as f64 * 1000.0 * factor) as i64;
            (now - last_run > Duration::milliseconds(limit_ms)).then(|| job.job_id.clone())
        })
        .collect();
    stale.sort();
    stale
}

/// Classify from the running flag, recent failure statistics and stale jobs.
pub(crate) fn evaluate(
    running: bool,
    stats: WindowStats,
    stale_jobs: Vec<String>,
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> HealthReport {
    let failure_rate = stats.failure_rate();
    let mut status = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    if !running {
        status = HealthStatus::Unhealthy;
        reasons.push("scheduler is not running".to_string());
    }

    if failure_rate > thresholds.unhealthy_failure_rate {
        status = status.max(HealthStatus::Unhealthy);
        reasons.push(format!(
            "failure rate {failure_rate:.2} above {:.2}",
            thresholds.unhealthy_failure_rate
        ));
    } else if failure_rate > thresholds.degraded_failure_rate {
        status = status.max(HealthStatus::Degraded);
        reasons.push(format!(
            "failure rate {failure_rate:.2} above {:.2}",
            thresholds.degraded_failure_rate
        ));
    }

    if !stale_jobs.is_empty() {
        status = status.max(HealthStatus::Degraded);
        reasons.push(format!("stale jobs: {}", stale_jobs.join(", ")));
    }

    HealthReport {
        status,
        running,
        failure_rate,
        window_size: stats.considered,
        recent_failures: stats.failures,
        stale_jobs,
        reasons,
        checked_at: now,
    }
}
