use std::sync::OnceLock;

use sprout_core::SchedulerSettings;

use crate::engine::Scheduler;
use crate::error::{Result, SchedulerError};

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// Install the process-wide scheduler. Fails if one is already installed.
///
/// Prefer passing a [`Scheduler`] handle explicitly; this exists for task
/// bodies that need to reach the scheduler from deep inside unrelated code.
pub fn init_global(settings: SchedulerSettings) -> Result<&'static Scheduler> {
    install_global(Scheduler::new(settings))
}

/// Install an already-built scheduler (e.g. one with a custom clock).
pub fn install_global(scheduler: Scheduler) -> Result<&'static Scheduler> {
    let mut installed = false;
    let global = GLOBAL.get_or_init(|| {
        installed = true;
        scheduler
    });
    if installed {
        Ok(global)
    } else {
        Err(SchedulerError::AlreadyInitialized)
    }
}

/// The process-wide scheduler, if one was installed.
pub fn global() -> Option<&'static Scheduler> {
    GLOBAL.get()
}
