use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sprout_core::{JobSpec, Schedule, SchedulerSettings, TaskArgs, TimeOfDay};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, SchedulerError},
    health::{self, HealthReport, SchedulerStatus},
    history::History,
    hooks::{HookRegistry, JobHook},
    pool::ExecutionPool,
    registry::{Task, TaskRegistry},
    schedule::initial_next_run,
    store::{Dispatch, JobStore},
    types::{namespace_for, ExportedJob, JobOptions, JobResult, ScheduledJob},
};

/// Process-wide background scheduler.
///
/// Cheap to clone: every clone is a handle onto the same job store, registry
/// and worker pool. Construct one at the host's composition root and pass it
/// to whatever needs it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// State shared by the public handle, the clock loop and the pool workers.
/// The background tasks hold only a `Weak` so dropping every handle shuts
/// them down.
pub(crate) struct Inner {
    pub(crate) settings: SchedulerSettings,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) registry: TaskRegistry,
    pub(crate) hooks: HookRegistry,
    /// Job records and the due-job index, always locked as one unit.
    store: Mutex<JobStore>,
    history: Mutex<History>,
    pool: ExecutionPool,
    running: AtomicBool,
    clock_loop: Mutex<Option<ClockLoop>>,
}

struct ClockLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Inner {
    pub(crate) fn lock_store(&self) -> MutexGuard<'_, JobStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Undo the in-flight mark of an occurrence that never ran.
    pub(crate) fn release(&self, dispatch: &Dispatch) {
        self.lock_store().release(dispatch);
    }

    /// Drain every due occurrence into the execution pool.
    fn tick(&self) -> Result<usize> {
        if !self.pool.is_open() {
            return Err(SchedulerError::PoolClosed);
        }

        let now = self.clock.now();
        let due = self.lock_store().take_due(now);

        let mut dispatched = 0;
        let mut rejected = 0;
        for dispatch in due {
            debug!(
                job_id = %dispatch.job_id,
                task = %dispatch.task_name,
                scheduled_for = %dispatch.scheduled_for,
                "dispatching job"
            );
            match self.pool.submit(dispatch) {
                Ok(()) => dispatched += 1,
                Err(returned) => {
                    self.lock_store().restore(&returned);
                    rejected += 1;
                }
            }
        }

        if rejected > 0 {
            warn!(rejected, "execution pool closed during tick; occurrences put back");
            return Err(SchedulerError::PoolClosed);
        }
        Ok(dispatched)
    }
}

impl Scheduler {
    /// Scheduler driven by the real UTC clock.
    pub fn new(settings: SchedulerSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Scheduler driven by a custom clock (e.g. [`crate::ManualClock`]).
    pub fn with_clock(settings: SchedulerSettings, clock: Arc<dyn Clock>) -> Self {
        let inner = Inner {
            registry: TaskRegistry::new(),
            hooks: HookRegistry::new(),
            store: Mutex::new(JobStore::new()),
            history: Mutex::new(History::new(settings.history_size)),
            pool: ExecutionPool::new(settings.max_workers),
            running: AtomicBool::new(false),
            clock_loop: Mutex::new(None),
            clock,
            settings,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // --- task registry -----------------------------------------------------

    /// Bind `name` to a callable. Re-registering a name replaces the callable.
    pub fn register_task(&self, name: &str, task: impl Task + 'static) {
        self.inner.registry.register(name, Arc::new(task));
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    // --- lifecycle hooks ---------------------------------------------------

    /// Lower `priority` runs first.
    pub fn add_hook(&self, name: &str, hook: Arc<dyn JobHook>, priority: i32) {
        self.inner.hooks.register(name, hook, priority);
    }

    pub fn remove_hook(&self, name: &str) {
        self.inner.hooks.unregister(name);
    }

    // --- scheduling constructors -------------------------------------------

    /// Run `task` every `seconds`, first at `now` or one period from now.
    pub fn schedule_interval(
        &self,
        task: &str,
        seconds: u64,
        start_immediately: bool,
    ) -> Result<String> {
        self.schedule_job(
            task,
            Schedule::Interval { every_secs: seconds },
            start_immediately,
            JobOptions::default(),
        )
    }

    /// Run `task` every day at `time` ("HH:MM", UTC).
    pub fn schedule_daily(&self, task: &str, time: &str) -> Result<String> {
        let time = parse_time(time)?;
        self.schedule_job(task, Schedule::Daily { time }, false, JobOptions::default())
    }

    /// Run `task` every week on `weekday` (0 = Monday … 6 = Sunday) at `time`.
    pub fn schedule_weekly(&self, task: &str, weekday: u8, time: &str) -> Result<String> {
        let time = parse_time(time)?;
        self.schedule_job(task, Schedule::Weekly { day: weekday, time }, false, JobOptions::default())
    }

    /// Run `task` once at `run_at`; an instant in the past fires on the next tick.
    pub fn schedule_once(&self, task: &str, run_at: DateTime<Utc>) -> Result<String> {
        self.schedule_job(task, Schedule::Once { at: run_at }, false, JobOptions::default())
    }

    /// General constructor behind the `schedule_*` helpers.
    ///
    /// The task name is not resolved here; an unregistered task only fails
    /// when the job is dispatched.
    pub fn schedule_job(
        &self,
        task: &str,
        schedule: Schedule,
        start_immediately: bool,
        opts: JobOptions,
    ) -> Result<String> {
        if task.trim().is_empty() {
            return Err(SchedulerError::Configuration("task name must not be empty".into()));
        }
        schedule.validate().map_err(SchedulerError::Configuration)?;

        let now = self.inner.clock.now();
        let job_id = opts.job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        // A job created disabled is armed relative to the moment it is enabled.
        let next_run = opts.enabled.then(|| initial_next_run(&schedule, now, start_immediately));
        let summary = schedule.to_string();

        let job = ScheduledJob {
            job_id: job_id.clone(),
            task_name: task.to_string(),
            namespace: opts.namespace.unwrap_or_else(|| namespace_for(task)),
            schedule,
            enabled: opts.enabled,
            args: opts.args,
            next_run,
            last_run: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            last_error: None,
            timeout_secs: opts.timeout_secs,
            overlap: opts.overlap,
            running: 0,
            created_at: now,
        };
        self.inner.lock_store().insert(job)?;

        if !self.inner.registry.contains(task) {
            debug!(job_id = %job_id, task, "job scheduled for a task that is not registered yet");
        }
        info!(job_id = %job_id, task, schedule = %summary, next_run = ?next_run, "job scheduled");
        Ok(job_id)
    }

    /// Install a declaratively described job (e.g. from sprout.toml).
    pub fn install(&self, spec: &JobSpec) -> Result<String> {
        let opts = JobOptions {
            job_id: spec.id.clone(),
            namespace: spec.namespace.clone(),
            args: spec.args.clone(),
            enabled: spec.enabled,
            timeout_secs: spec.timeout_secs,
            overlap: spec.overlap,
        };
        self.schedule_job(&spec.task, spec.schedule.clone(), spec.start_immediately, opts)
    }

    /// Install every job spec, stopping at the first invalid one.
    pub fn install_all(&self, specs: &[JobSpec]) -> Result<Vec<String>> {
        specs.iter().map(|spec| self.install(spec)).collect()
    }

    // --- ad-hoc execution --------------------------------------------------

    /// Run `task` right now, outside the schedule and the worker pool.
    ///
    /// The outcome is recorded to history like any scheduled run. Returns
    /// `TaskNotRegistered` without recording anything when the name is unknown.
    pub async fn run_now(&self, task: &str, args: TaskArgs) -> Result<JobResult> {
        self.inner.run_adhoc(task, args).await
    }

    // --- job management ----------------------------------------------------

    /// Jobs ordered by creation time, optionally filtered.
    pub fn get_jobs(&self, namespace: Option<&str>, enabled_only: bool) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self
            .inner
            .lock_store()
            .jobs()
            .filter(|j| namespace.map_or(true, |ns| j.namespace == ns))
            .filter(|j| !enabled_only || j.enabled)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        jobs
    }

    pub fn get_job(&self, id: &str) -> Option<ScheduledJob> {
        self.inner.lock_store().get(id).cloned()
    }

    pub fn enable_job(&self, id: &str) -> Result<()> {
        let now = self.inner.clock.now();
        let next_run = self.inner.lock_store().enable(id, now)?;
        info!(job_id = %id, %next_run, "job enabled");
        Ok(())
    }

    /// Prevents future firings; an execution already in flight is not cancelled.
    pub fn disable_job(&self, id: &str) -> Result<()> {
        self.inner.lock_store().disable(id)?;
        info!(job_id = %id, "job disabled");
        Ok(())
    }

    pub fn pause_job(&self, id: &str) -> Result<()> {
        self.disable_job(id)
    }

    pub fn resume_job(&self, id: &str) -> Result<()> {
        self.enable_job(id)
    }

    /// Delete a job. Returns the removed record.
    pub fn remove_job(&self, id: &str) -> Result<ScheduledJob> {
        let job = self.inner.lock_store().remove(id)?;
        info!(job_id = %id, task = %job.task_name, "job removed");
        Ok(job)
    }

    // --- observability -----------------------------------------------------

    /// Newest-first completed results, optionally filtered.
    pub fn get_history(
        &self,
        job_id: Option<&str>,
        namespace: Option<&str>,
        limit: usize,
    ) -> Vec<JobResult> {
        self.inner.lock_history().query(job_id, namespace, limit)
    }

    pub fn get_status(&self) -> SchedulerStatus {
        let (total_jobs, enabled_jobs, pending_jobs, namespaces, index_entries) = {
            let store = self.inner.lock_store();
            (
                store.len(),
                store.jobs().filter(|j| j.enabled).count(),
                store.pending_count(),
                store.namespaces(),
                store.index_len(),
            )
        };
        let (history_size, stats) = {
            let history = self.inner.lock_history();
            (history.len(), history.window_stats(self.inner.settings.health.window))
        };

        SchedulerStatus {
            running: self.is_running(),
            total_jobs,
            enabled_jobs,
            pending_jobs,
            namespaces,
            recent_failures: stats.failures,
            history_size,
            max_workers: self.inner.pool.max_workers(),
            active_workers: self.inner.pool.active(),
            queued_jobs: self.inner.pool.queued(),
            index_entries,
        }
    }

    pub fn health_check(&self) -> HealthReport {
        let thresholds = &self.inner.settings.health;
        let now = self.inner.clock.now();
        let stale = health::stale_jobs(self.inner.lock_store().jobs(), thresholds.stale_factor, now);
        let stats = self.inner.lock_history().window_stats(thresholds.window);
        health::evaluate(self.is_running(), stats, stale, thresholds, now)
    }

    /// Declarative `{job_id: {task, args, kwargs, schedule}}` view of every
    /// job. Pure read; the seam for handing jobs to an external task queue.
    pub fn export_schedule_config(&self) -> BTreeMap<String, ExportedJob> {
        self.inner
            .lock_store()
            .jobs()
            .map(|j| (j.job_id.clone(), ExportedJob::from(j)))
            .collect()
    }

    // --- run control -------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Start the worker pool and the clock loop. Idempotent.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            SchedulerError::Configuration("scheduler must be started inside a Tokio runtime".into())
        })?;

        let mut clock_loop = self.inner.clock_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if clock_loop.is_some() {
            debug!("scheduler already running");
            return Ok(());
        }

        self.inner.pool.start(Arc::downgrade(&self.inner));

        let settings = &self.inner.settings;
        let tick = Duration::from_millis(settings.tick_interval_ms.max(1));
        let backoff = Duration::from_millis(settings.error_backoff_ms);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_clock_loop(Arc::downgrade(&self.inner), tick, backoff, shutdown_rx));

        *clock_loop = Some(ClockLoop { shutdown, handle });
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            tick_ms = settings.tick_interval_ms,
            max_workers = self.inner.pool.max_workers(),
            "scheduler started"
        );
        Ok(())
    }

    /// Halt the clock loop, then the pool.
    ///
    /// `Some(bound)` waits up to `bound` for queued and in-flight work;
    /// `None` drops queued work immediately. In-flight task bodies are never
    /// aborted. No-op when not running.
    pub async fn stop(&self, wait: Option<Duration>) -> Result<()> {
        let clock_loop = self.inner.clock_loop.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(ClockLoop { shutdown, handle }) = clock_loop else {
            return Ok(());
        };

        self.inner.running.store(false, Ordering::SeqCst);
        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            error!("clock loop task failed: {e}");
        }
        self.inner.pool.shutdown(wait).await?;
        info!("scheduler stopped");
        Ok(())
    }

    /// Graceful stop bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        let bound = Duration::from_secs(self.inner.settings.shutdown_timeout_secs);
        self.stop(Some(bound)).await
    }

    /// Process due jobs once, exactly as the clock loop does on each tick.
    /// Returns the number of occurrences handed to the pool.
    pub fn tick(&self) -> Result<usize> {
        self.inner.tick()
    }
}

fn parse_time(time: &str) -> Result<TimeOfDay> {
    time.parse::<TimeOfDay>().map_err(SchedulerError::Configuration)
}

/// Clock loop. Wakes every `tick`, never waits on job execution, and exits
/// when `shutdown` broadcasts `true` or every scheduler handle is dropped.
async fn run_clock_loop(
    inner: Weak<Inner>,
    tick: Duration,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("scheduler clock loop started");

    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(scheduler) = inner.upgrade() else { break };
                let outcome = scheduler.tick();
                drop(scheduler);

                if let Err(e) = outcome {
                    error!("scheduler tick error: {e}; retrying in {}ms", backoff.as_millis());
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("scheduler clock loop stopped");
}
