use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::SchedulerError;
use crate::types::JobResult;

/// Identifies the execution a start hook is told about.
#[derive(Debug, Clone)]
pub struct JobStart {
    pub job_id: String,
    pub task_name: String,
    pub namespace: String,
    /// `None` for ad-hoc `run_now` calls.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

/// Observer of job executions.
///
/// Hooks run on the worker that executed the job, after the job-store lock is
/// released, so they may call back into the scheduler. They are best-effort:
/// an `Err` or a panic is logged and swallowed. Keep them cheap; a slow hook
/// occupies an execution slot.
pub trait JobHook: Send + Sync {
    fn on_start(&self, _job: &JobStart) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_complete(&self, _result: &JobResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_error(&self, _result: &JobResult) -> anyhow::Result<()> {
        Ok(())
    }
}

struct HookEntry {
    name: String,
    hook: Arc<dyn JobHook>,
    /// Lower value = earlier execution. Ties broken by registration order.
    priority: i32,
}

/// Ordered set of lifecycle hooks.
#[derive(Default)]
pub struct HookRegistry {
    /// Sorted by priority ascending after every registration.
    hooks: RwLock<Vec<HookEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, hook: Arc<dyn JobHook>, priority: i32) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.push(HookEntry { name: name.to_string(), hook, priority });
        // Stable sort preserves registration order within the same priority.
        hooks.sort_by_key(|h| h.priority);
        debug!(hook = %name, "job hook registered");
    }

    /// Silent no-op if the name is not found.
    pub fn unregister(&self, name: &str) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|h| h.name != name);
        if hooks.len() < before {
            debug!(hook = %name, "job hook unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fire_start(&self, job: &JobStart) {
        self.fire("on_start", |h| h.on_start(job));
    }

    /// Dispatches to `on_complete` or `on_error` depending on the outcome.
    pub fn fire_finished(&self, result: &JobResult) {
        if result.success {
            self.fire("on_complete", |h| h.on_complete(result));
        } else {
            self.fire("on_error", |h| h.on_error(result));
        }
    }

    fn fire(&self, point: &str, call: impl Fn(&dyn JobHook) -> anyhow::Result<()>) {
        // Snapshot so no lock is held while hook code runs; hooks may re-enter.
        let snapshot: Vec<(String, Arc<dyn JobHook>)> = {
            let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
            if hooks.is_empty() {
                return;
            }
            hooks.iter().map(|h| (h.name.clone(), Arc::clone(&h.hook))).collect()
        };

        for (name, hook) in snapshot {
            let reason = match catch_unwind(AssertUnwindSafe(|| call(hook.as_ref()))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => "hook panicked".to_string(),
            };
            let err = SchedulerError::Callback { hook: name, reason };
            error!(point, "{err}");
        }
    }
}
