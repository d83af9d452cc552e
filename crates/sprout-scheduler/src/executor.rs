use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sprout_core::TaskArgs;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::engine::Inner;
use crate::error::Result;
use crate::hooks::JobStart;
use crate::registry::Task;
use crate::store::Dispatch;
use crate::types::{namespace_for, JobResult};

impl Inner {
    /// Run one scheduled occurrence on the calling worker.
    ///
    /// Never fails: a missing task, an `Err` and a panic all end up as a
    /// failed [`JobResult`] in history.
    pub(crate) async fn execute(&self, dispatch: Dispatch) {
        let Dispatch { job_id, task_name, namespace, args, scheduled_for, timeout_secs, generation } = dispatch;

        let started_at = self.clock.now();
        self.hooks.fire_start(&JobStart {
            job_id: job_id.clone(),
            task_name: task_name.clone(),
            namespace: namespace.clone(),
            scheduled_for: Some(scheduled_for),
            started_at,
        });

        let outcome = match self.registry.lookup(&task_name) {
            Ok(task) => self.invoke(&job_id, task, args, timeout_secs).await,
            Err(e) => Err(e.to_string()),
        };

        let result = JobResult {
            job_id,
            task_name,
            namespace,
            success: outcome.is_ok(),
            scheduled_for: Some(scheduled_for),
            started_at,
            completed_at: self.clock.now(),
            result: outcome.as_ref().ok().cloned(),
            error: outcome.err(),
        };
        self.finish(result, Some(generation));
    }

    /// Ad-hoc execution behind `Scheduler::run_now`.
    pub(crate) async fn run_adhoc(&self, task_name: &str, args: TaskArgs) -> Result<JobResult> {
        let task = self.registry.lookup(task_name)?;

        let job_id = format!("manual:{task_name}");
        let namespace = namespace_for(task_name);
        let started_at = self.clock.now();
        self.hooks.fire_start(&JobStart {
            job_id: job_id.clone(),
            task_name: task_name.to_string(),
            namespace: namespace.clone(),
            scheduled_for: None,
            started_at,
        });

        let outcome = self.invoke(&job_id, task, args, None).await;
        let result = JobResult {
            job_id,
            task_name: task_name.to_string(),
            namespace,
            success: outcome.is_ok(),
            scheduled_for: None,
            started_at,
            completed_at: self.clock.now(),
            result: outcome.as_ref().ok().cloned(),
            error: outcome.err(),
        };
        self.finish(result.clone(), None);
        Ok(result)
    }

    /// Call the task on its own Tokio task so a panic stays contained.
    ///
    /// The timeout is advisory: an overrun is logged and the run is awaited
    /// to completion.
    async fn invoke(
        &self,
        job_id: &str,
        task: Arc<dyn Task>,
        args: TaskArgs,
        timeout_secs: Option<u64>,
    ) -> std::result::Result<Value, String> {
        let mut handle = tokio::spawn(async move { task.run(args).await });

        let joined = match timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(job_id = %job_id, timeout_secs = secs, "job exceeded its timeout, still running");
                    handle.await
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(e) => Err(join_failure(e)),
        }
    }

    /// Counters first, then history, then hooks: anything that observes a
    /// history entry also sees the matching job counters. Ad-hoc runs carry
    /// no store generation and touch no job record.
    fn finish(&self, result: JobResult, generation: Option<u64>) {
        if let Some(generation) = generation {
            self.lock_store().record_outcome(&result, generation);
        }
        self.lock_history().push(result.clone());
        self.hooks.fire_finished(&result);

        let duration_ms = result.duration().num_milliseconds();
        match &result.error {
            None => info!(
                job_id = %result.job_id,
                task = %result.task_name,
                duration_ms,
                "job completed"
            ),
            Some(error) => warn!(
                job_id = %result.job_id,
                task = %result.task_name,
                duration_ms,
                %error,
                "job failed"
            ),
        }
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("task aborted: {err}");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("task panicked: {message}")
}
