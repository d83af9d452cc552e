use std::sync::Arc;

use async_trait::async_trait;
use sprout_core::{JobSpec, TaskArgs};

use crate::engine::Scheduler;
use crate::error::Result;
use crate::registry::Task;
use crate::types::JobResult;

/// The execution surface task bodies and hosts depend on.
///
/// [`Scheduler`] is the in-process implementation. A backend built on an
/// external distributed queue can implement the same trait, fed by
/// [`Scheduler::export_schedule_config`], without any task body changing.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn register(&self, name: &str, task: Arc<dyn Task>);

    async fn run_now(&self, task: &str, args: TaskArgs) -> Result<JobResult>;

    /// Install a job and return its id.
    fn schedule(&self, spec: &JobSpec) -> Result<String>;
}

#[async_trait]
impl TaskQueue for Scheduler {
    fn register(&self, name: &str, task: Arc<dyn Task>) {
        self.registry().register(name, task);
    }

    async fn run_now(&self, task: &str, args: TaskArgs) -> Result<JobResult> {
        Scheduler::run_now(self, task, args).await
    }

    fn schedule(&self, spec: &JobSpec) -> Result<String> {
        self.install(spec)
    }
}
