use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No callable is registered under the task name. Raised at dispatch time,
    /// never when the job is scheduled.
    #[error("Task not registered: {name}")]
    TaskNotRegistered { name: String },

    /// The task body returned an error or panicked.
    #[error("Task execution failed: {0}")]
    TaskExecution(String),

    /// A lifecycle hook failed. Always logged and swallowed.
    #[error("Lifecycle hook '{hook}' failed: {reason}")]
    Callback { hook: String, reason: String },

    /// Rejected schedule parameters or job options.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The execution pool is stopped and cannot accept work.
    #[error("Execution pool is not running")]
    PoolClosed,

    /// The process-wide scheduler was already installed.
    #[error("Global scheduler already initialised")]
    AlreadyInitialized,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
