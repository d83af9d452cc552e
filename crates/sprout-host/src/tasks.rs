//! Built-in maintenance tasks shipped with the host.

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use sprout_core::{JobSpec, Schedule, TaskArgs};
use sprout_scheduler::{HealthStatus, Scheduler};
use tracing::{debug, warn};

pub fn register_builtin(scheduler: &Scheduler) {
    scheduler.register_task("system.heartbeat", heartbeat);
    scheduler.register_task("system.health_report", health_report);
    scheduler.register_task("system.schedule_snapshot", schedule_snapshot);
}

/// Installed when the config file declares no jobs.
pub fn default_jobs() -> Vec<JobSpec> {
    let mut heartbeat = JobSpec::new("system.heartbeat", Schedule::Interval { every_secs: 60 });
    heartbeat.id = Some("heartbeat".into());
    heartbeat.start_immediately = true;

    let mut health = JobSpec::new("system.health_report", Schedule::Interval { every_secs: 300 });
    health.id = Some("health-report".into());

    vec![heartbeat, health]
}

async fn heartbeat(_args: TaskArgs) -> anyhow::Result<Value> {
    Ok(json!({ "at": Utc::now().to_rfc3339() }))
}

/// Logs a warning whenever the scheduler is not healthy.
async fn health_report(_args: TaskArgs) -> anyhow::Result<Value> {
    let scheduler = sprout_scheduler::global().context("global scheduler not initialised")?;
    let report = scheduler.health_check();
    if report.status != HealthStatus::Healthy {
        warn!(status = %report.status, reasons = ?report.reasons, "scheduler health check");
    }
    Ok(serde_json::to_value(report)?)
}

/// Declarative dump of every installed job, e.g. for handing off to an
/// external queue. `namespace` kwarg narrows the dump.
async fn schedule_snapshot(args: TaskArgs) -> anyhow::Result<Value> {
    let scheduler = sprout_scheduler::global().context("global scheduler not initialised")?;
    let namespace = args.kwarg("namespace").and_then(Value::as_str).map(str::to_string);

    let wanted: Option<Vec<String>> = namespace
        .map(|ns| scheduler.get_jobs(Some(&ns), false).into_iter().map(|j| j.job_id).collect());

    let mut jobs = serde_json::Map::new();
    for (id, job) in scheduler.export_schedule_config() {
        if wanted.as_ref().map_or(true, |w| w.contains(&id)) {
            jobs.insert(id, serde_json::to_value(job)?);
        }
    }
    debug!(jobs = jobs.len(), "schedule snapshot taken");
    Ok(Value::Object(jobs))
}
