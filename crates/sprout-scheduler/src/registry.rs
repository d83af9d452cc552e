use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sprout_core::TaskArgs;
use tracing::debug;

use crate::error::{Result, SchedulerError};

/// A named unit of work. The scheduler never looks inside a task: it only
/// hands over the stored arguments and records what comes back.
///
/// Any `Fn(TaskArgs) -> impl Future<Output = anyhow::Result<Value>>` closure
/// is a task, so most hosts never implement this trait by hand.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, args: TaskArgs) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> Task for F
where
    F: Fn(TaskArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, args: TaskArgs) -> anyhow::Result<Value> {
        (self)(args).await
    }
}

/// Name → callable lookup table. Last registration wins.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, task: Arc<dyn Task>) {
        if self.tasks.insert(name.to_string(), task).is_some() {
            debug!(task = %name, "task re-registered, previous callable replaced");
        } else {
            debug!(task = %name, "task registered");
        }
    }

    /// Returns `true` when a task was removed.
    pub fn unregister(&self, name: &str) -> bool {
        self.tasks.remove(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Task>> {
        self.tasks
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| SchedulerError::TaskNotRegistered { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(v: i64) -> Arc<dyn Task> {
        Arc::new(move |_args: TaskArgs| async move { anyhow::Ok(json!(v)) })
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = TaskRegistry::new();
        registry.register("sensors.ping", constant(42));

        let task = registry.lookup("sensors.ping").unwrap();
        assert_eq!(task.run(TaskArgs::new()).await.unwrap(), json!(42));
        assert_eq!(registry.task_names(), ["sensors.ping"]);
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = TaskRegistry::new();
        registry.register("ping", constant(1));
        registry.register("ping", constant(2));

        let task = registry.lookup("ping").unwrap();
        assert_eq!(task.run(TaskArgs::new()).await.unwrap(), json!(2));
    }

    #[test]
    fn missing_task_is_an_error() {
        let registry = TaskRegistry::new();
        match registry.lookup("nope") {
            Err(SchedulerError::TaskNotRegistered { name }) => assert_eq!(name, "nope"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("lookup of unregistered task succeeded"),
        }
    }

    #[tokio::test]
    async fn closures_receive_arguments() {
        let registry = TaskRegistry::new();
        registry.register(
            "echo",
            Arc::new(|args: TaskArgs| async move {
                anyhow::Ok(args.kwarg("zone").cloned().unwrap_or(Value::Null))
            }),
        );
        let task = registry.lookup("echo").unwrap();
        let out = task.run(TaskArgs::new().with_kwarg("zone", "bed-2")).await.unwrap();
        assert_eq!(out, json!("bed-2"));
        assert!(registry.unregister("echo"));
        assert!(!registry.contains("echo"));
    }
}
