use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sprout_core::{OverlapPolicy, Schedule, TaskArgs};

use crate::error::{Result, SchedulerError};

/// Namespace used when a task name carries no `prefix.` part.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Derive a grouping label from a task name: `"sensors.poll_soil"` → `"sensors"`.
pub fn namespace_for(task_name: &str) -> String {
    match task_name.split_once('.') {
        Some((prefix, _)) if !prefix.is_empty() => prefix.to_string(),
        _ => DEFAULT_NAMESPACE.to_string(),
    }
}

/// Per-job knobs accepted by [`crate::Scheduler::schedule_job`].
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Stable id; a UUID is generated when absent.
    pub job_id: Option<String>,
    /// Overrides the namespace derived from the task name.
    pub namespace: Option<String>,
    pub args: TaskArgs,
    pub enabled: bool,
    /// Advisory only: overruns are logged, the task is never preempted.
    pub timeout_secs: Option<u64>,
    pub overlap: OverlapPolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            namespace: None,
            args: TaskArgs::default(),
            enabled: true,
            timeout_secs: None,
            overlap: OverlapPolicy::Allow,
        }
    }
}

impl JobOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_args(mut self, args: TaskArgs) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A job record held in the in-memory job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: String,
    /// Key into the task registry; resolved at dispatch time.
    pub task_name: String,
    pub namespace: String,
    pub schedule: Schedule,
    pub enabled: bool,
    pub args: TaskArgs,
    /// `None` means no future firing (disabled before arming, or a spent once job).
    pub next_run: Option<DateTime<Utc>>,
    /// Start time of the most recent completed firing.
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Occurrences not dispatched because of [`OverlapPolicy::SkipIfRunning`].
    pub skipped_count: u64,
    pub last_error: Option<String>,
    pub timeout_secs: Option<u64>,
    pub overlap: OverlapPolicy,
    /// Executions dispatched but not yet finished.
    pub running: u32,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// A job is pending when it will fire again without further intervention.
    pub fn is_pending(&self) -> bool {
        self.enabled && self.next_run.is_some()
    }
}

/// Outcome of one task invocation. Immutable once written to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub task_name: String,
    pub namespace: String,
    pub success: bool,
    /// Occurrence this run belongs to; `None` for ad-hoc `run_now` calls.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Opaque value returned by the task on success.
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    /// Convert into the task's return value, surfacing a failure as
    /// [`SchedulerError::TaskExecution`].
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(SchedulerError::TaskExecution(self.error.unwrap_or_default()))
        }
    }
}

/// One entry of [`crate::Scheduler::export_schedule_config`]: the declarative
/// shape an external task queue needs to take over a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedJob {
    pub task: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub schedule: Schedule,
}

impl From<&ScheduledJob> for ExportedJob {
    fn from(job: &ScheduledJob) -> Self {
        Self {
            task: job.task_name.clone(),
            args: job.args.args.clone(),
            kwargs: job.args.kwargs.clone(),
            schedule: job.schedule.clone(),
        }
    }
}
