// End-to-end behaviour of the scheduler: clock loop, pool, history, health.
// Most tests drive a ManualClock and call `tick()` by hand; the clock loop's
// own tick is set to an hour so it never interferes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use sprout_core::JobSpec;
use sprout_scheduler::{
    HealthStatus, JobHook, JobOptions, JobResult, JobStart, ManualClock, OverlapPolicy, Schedule,
    Scheduler, SchedulerError, SchedulerSettings, TaskArgs,
};
use tokio::sync::Semaphore;

fn t0() -> DateTime<Utc> {
    // Monday
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

fn manual_settings(max_workers: usize) -> SchedulerSettings {
    SchedulerSettings { tick_interval_ms: 3_600_000, max_workers, ..SchedulerSettings::default() }
}

fn manual_scheduler(max_workers: usize) -> (Scheduler, ManualClock) {
    let clock = ManualClock::new(t0());
    let scheduler = Scheduler::with_clock(manual_settings(max_workers), Arc::new(clock.clone()));
    (scheduler, clock)
}

fn register_counter(scheduler: &Scheduler, name: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    scheduler.register_task(name, move |_args: TaskArgs| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(json!(42))
        }
    });
    calls
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(StdDuration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_history(scheduler: &Scheduler, count: usize) {
    wait_until(|| scheduler.get_history(None, None, usize::MAX).len() >= count).await;
}

#[tokio::test]
async fn interval_is_fixed_rate() {
    let (scheduler, clock) = manual_scheduler(2);
    register_counter(&scheduler, "sensors.poll");
    let id = scheduler.schedule_interval("sensors.poll", 60, true).unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;
    assert_eq!(scheduler.get_job(&id).unwrap().next_run, Some(t0() + Duration::seconds(60)));

    // Fires 5 s late; the next slot stays anchored to the scheduled time.
    clock.advance(Duration::seconds(65));
    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 2).await;

    let job = scheduler.get_job(&id).unwrap();
    assert_eq!(job.next_run, Some(t0() + Duration::seconds(120)));
    assert_eq!(job.run_count, 2);
    assert_eq!(job.last_run, Some(t0() + Duration::seconds(65)));

    let history = scheduler.get_history(Some(&id), None, 10);
    assert_eq!(history[0].scheduled_for, Some(t0() + Duration::seconds(60)));
    assert_eq!(history[1].scheduled_for, Some(t0()));

    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn clock_skip_fires_once_without_backlog() {
    let (scheduler, clock) = manual_scheduler(2);
    let calls = register_counter(&scheduler, "sweep");
    let id = scheduler.schedule_interval("sweep", 10, false).unwrap();
    scheduler.start().unwrap();

    // Suspended for 9.5 periods.
    clock.advance(Duration::seconds(95));
    assert_eq!(scheduler.tick().unwrap(), 1);
    assert_eq!(scheduler.tick().unwrap(), 0);
    wait_for_history(&scheduler, 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_job(&id).unwrap().next_run, Some(t0() + Duration::seconds(100)));

    scheduler.stop(None).await.unwrap();
}

#[tokio::test]
async fn removed_job_never_runs() {
    let (scheduler, _clock) = manual_scheduler(2);
    let calls = register_counter(&scheduler, "prune");
    let id = scheduler.schedule_interval("prune", 5, true).unwrap();
    scheduler.start().unwrap();

    let removed = scheduler.remove_job(&id).unwrap();
    assert_eq!(removed.task_name, "prune");
    assert_eq!(scheduler.get_status().index_entries, 1);

    assert_eq!(scheduler.tick().unwrap(), 0);
    assert_eq!(scheduler.get_status().index_entries, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(scheduler.get_history(None, None, 10).is_empty());

    assert!(matches!(scheduler.remove_job(&id), Err(SchedulerError::JobNotFound { .. })));
    scheduler.stop(None).await.unwrap();
}

#[test]
fn daily_and_weekly_constructors() {
    let (scheduler, clock) = manual_scheduler(1);

    let before = scheduler.schedule_daily("growth.tick", "09:00").unwrap();
    assert_eq!(
        scheduler.get_job(&before).unwrap().next_run,
        Some(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap())
    );

    clock.set(Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap());
    let after = scheduler.schedule_daily("growth.tick", "09:00").unwrap();
    assert_eq!(
        scheduler.get_job(&after).unwrap().next_run,
        Some(Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap())
    );

    // Wednesday 15:00, asking for Wednesday 14:00.
    clock.set(Utc.with_ymd_and_hms(2026, 10, 21, 15, 0, 0).unwrap());
    let weekly = scheduler.schedule_weekly("maintenance.report", 2, "14:00").unwrap();
    let job = scheduler.get_job(&weekly).unwrap();
    assert_eq!(job.next_run, Some(Utc.with_ymd_and_hms(2026, 10, 28, 14, 0, 0).unwrap()));
    assert_eq!(job.namespace, "maintenance");
}

#[test]
fn malformed_schedules_are_rejected_synchronously() {
    let (scheduler, _clock) = manual_scheduler(1);

    for bad in ["25:00", "9am", "09:60", ""] {
        assert!(
            matches!(scheduler.schedule_daily("t", bad), Err(SchedulerError::Configuration(_))),
            "{bad:?} accepted"
        );
    }
    assert!(matches!(scheduler.schedule_weekly("t", 7, "10:00"), Err(SchedulerError::Configuration(_))));
    assert!(matches!(scheduler.schedule_interval("t", 0, false), Err(SchedulerError::Configuration(_))));
    assert!(matches!(scheduler.schedule_interval("", 10, false), Err(SchedulerError::Configuration(_))));
    assert!(scheduler.get_jobs(None, false).is_empty());
}

#[tokio::test]
async fn failing_task_is_isolated() {
    let (scheduler, _clock) = manual_scheduler(2);
    scheduler.register_task("sensors.broken", |_args: TaskArgs| async {
        Err::<Value, _>(anyhow::anyhow!("sensor unreachable"))
    });
    scheduler.register_task("sensors.panicky", |_args: TaskArgs| async {
        if true {
            panic!("bus fault");
        }
        anyhow::Ok(Value::Null)
    });
    let good_calls = register_counter(&scheduler, "sensors.ok");

    let broken = scheduler.schedule_interval("sensors.broken", 30, true).unwrap();
    let panicky = scheduler.schedule_interval("sensors.panicky", 30, true).unwrap();
    let good = scheduler.schedule_interval("sensors.ok", 30, true).unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 3);
    wait_for_history(&scheduler, 3).await;

    let job = scheduler.get_job(&broken).unwrap();
    assert_eq!((job.run_count, job.failure_count), (1, 1));
    assert!(job.last_error.as_deref().unwrap().contains("sensor unreachable"));

    let job = scheduler.get_job(&panicky).unwrap();
    assert_eq!(job.failure_count, 1);
    assert!(job.last_error.as_deref().unwrap().contains("bus fault"));

    let job = scheduler.get_job(&good).unwrap();
    assert_eq!((job.success_count, job.failure_count), (1, 0));
    assert_eq!(good_calls.load(Ordering::SeqCst), 1);

    let failed = &scheduler.get_history(Some(&broken), None, 1)[0];
    assert!(!failed.success);
    assert!(failed.result.is_none());

    // No circuit breaker: failing jobs stay armed.
    assert!(scheduler.get_jobs(None, true).iter().all(|j| j.is_pending()));
    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn unregistered_task_fails_at_dispatch() {
    let (scheduler, _clock) = manual_scheduler(1);
    let id = scheduler.schedule_interval("ghost", 10, true).unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;

    let result = &scheduler.get_history(Some(&id), None, 1)[0];
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Task not registered: ghost"));
    scheduler.stop(None).await.unwrap();
}

#[tokio::test]
async fn pool_bounds_concurrency_and_queues_excess() {
    let (scheduler, _clock) = manual_scheduler(2);
    let gate = Arc::new(Semaphore::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    {
        let (gate, running, peak) = (gate.clone(), running.clone(), peak.clone());
        scheduler.register_task("block", move |_args: TaskArgs| {
            let (gate, running, peak) = (gate.clone(), running.clone(), peak.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let _permit = gate.acquire().await?;
                running.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(Value::Null)
            }
        });
    }

    for _ in 0..5 {
        scheduler.schedule_interval("block", 300, true).unwrap();
    }
    scheduler.start().unwrap();
    assert_eq!(scheduler.tick().unwrap(), 5);

    wait_until(|| {
        let status = scheduler.get_status();
        status.active_workers == 2 && status.queued_jobs == 3
    })
    .await;
    assert_eq!(running.load(Ordering::SeqCst), 2);
    assert!(scheduler.get_history(None, None, 10).is_empty());

    // Nothing was dropped: releasing the gate lets all five finish.
    gate.add_permits(5);
    wait_for_history(&scheduler, 5).await;
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert!(scheduler.get_history(None, None, 10).iter().all(|r| r.success));

    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn health_degrades_with_failure_rate() {
    let (scheduler, _clock) = manual_scheduler(1);
    scheduler.register_task("flaky", |args: TaskArgs| async move {
        if args.kwarg("fail") == Some(&json!(true)) {
            anyhow::bail!("flaked");
        }
        anyhow::Ok(json!("ok"))
    });

    assert_eq!(scheduler.health_check().status, HealthStatus::Unhealthy);
    scheduler.start().unwrap();
    assert_eq!(scheduler.health_check().status, HealthStatus::Healthy);

    for i in 0..10 {
        let args = TaskArgs::new().with_kwarg("fail", i < 3);
        scheduler.run_now("flaky", args).await.unwrap();
    }

    let report = scheduler.health_check();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!((report.failure_rate - 0.3).abs() < 1e-9);
    assert_eq!((report.window_size, report.recent_failures), (10, 3));
    assert_eq!(scheduler.get_status().recent_failures, 3);

    scheduler.stop(None).await.unwrap();
    assert_eq!(scheduler.health_check().status, HealthStatus::Unhealthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_runs_on_the_real_clock() {
    let settings = SchedulerSettings { tick_interval_ms: 100, ..SchedulerSettings::default() };
    let scheduler = Scheduler::new(settings);
    scheduler.register_task("ping", |_args: TaskArgs| async { anyhow::Ok(json!(42)) });
    scheduler.schedule_interval("ping", 1, true).unwrap();

    scheduler.start().unwrap();
    tokio::time::sleep(StdDuration::from_millis(2_500)).await;
    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();

    let history = scheduler.get_history(None, None, 100);
    assert!(history.len() >= 2, "only {} runs", history.len());
    assert!(history.iter().all(|r| r.success && r.result == Some(json!(42))));
}

#[tokio::test]
async fn overdue_once_job_fires_exactly_once() {
    let (scheduler, clock) = manual_scheduler(1);
    let calls = register_counter(&scheduler, "reminder");
    let id = scheduler.schedule_once("reminder", t0() - Duration::seconds(10)).unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;

    let job = scheduler.get_job(&id).unwrap();
    assert!(job.next_run.is_none());
    assert!(!job.enabled);

    clock.advance(Duration::days(1));
    assert_eq!(scheduler.tick().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_status().pending_jobs, 0);

    // A spent one-shot cannot be re-armed.
    let err = scheduler.enable_job(&id).unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));
    assert!(scheduler.resume_job(&id).is_err());
    let job = scheduler.get_job(&id).unwrap();
    assert!(job.next_run.is_none());
    assert!(!job.enabled);
    assert_eq!(job.run_count, 1);

    clock.advance(Duration::days(1));
    assert_eq!(scheduler.tick().unwrap(), 0);
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_history(None, None, 10).len(), 1);

    scheduler.stop(None).await.unwrap();
}

#[tokio::test]
async fn timeout_is_advisory_and_never_preempts() {
    let (scheduler, _clock) = manual_scheduler(1);
    scheduler.register_task("reports.build", |_args: TaskArgs| async {
        tokio::time::sleep(StdDuration::from_millis(1_500)).await;
        anyhow::Ok(json!("done"))
    });
    let id = scheduler
        .schedule_job(
            "reports.build",
            Schedule::Interval { every_secs: 3_600 },
            true,
            JobOptions::default().with_timeout_secs(1),
        )
        .unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;

    let run = &scheduler.get_history(None, None, 1)[0];
    assert!(run.success);
    assert_eq!(run.result, Some(json!("done")));
    assert!(run.error.is_none());
    let job = scheduler.get_job(&id).unwrap();
    assert_eq!((job.success_count, job.failure_count, job.running), (1, 0, 0));

    scheduler.stop(None).await.unwrap();
}

#[tokio::test]
async fn disabled_jobs_do_not_fire_until_enabled() {
    let (scheduler, clock) = manual_scheduler(1);
    let calls = register_counter(&scheduler, "drift.check");
    let id = scheduler.schedule_interval("drift.check", 10, true).unwrap();
    scheduler.start().unwrap();

    scheduler.pause_job(&id).unwrap();
    assert_eq!(scheduler.tick().unwrap(), 0);
    clock.advance(Duration::seconds(60));
    assert_eq!(scheduler.tick().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The stored next_run is still t0, so it fires on the next tick.
    scheduler.resume_job(&id).unwrap();
    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;
    assert_eq!(scheduler.get_job(&id).unwrap().next_run, Some(t0() + Duration::seconds(70)));

    assert!(matches!(scheduler.enable_job("missing"), Err(SchedulerError::JobNotFound { .. })));
    assert!(matches!(scheduler.disable_job("missing"), Err(SchedulerError::JobNotFound { .. })));
    scheduler.stop(None).await.unwrap();
}

#[test]
fn job_created_disabled_arms_on_enable() {
    let (scheduler, clock) = manual_scheduler(1);
    let id = scheduler
        .schedule_job("sweep", Schedule::Interval { every_secs: 30 }, false, JobOptions::default().disabled())
        .unwrap();
    assert!(scheduler.get_job(&id).unwrap().next_run.is_none());
    assert_eq!(scheduler.get_status().index_entries, 0);

    clock.advance(Duration::minutes(5));
    scheduler.enable_job(&id).unwrap();
    assert_eq!(
        scheduler.get_job(&id).unwrap().next_run,
        Some(t0() + Duration::minutes(5) + Duration::seconds(30))
    );
}

#[tokio::test]
async fn run_now_records_history_only() {
    let (scheduler, _clock) = manual_scheduler(1);
    register_counter(&scheduler, "sensors.ping");

    let result = scheduler.run_now("sensors.ping", TaskArgs::new()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.job_id, "manual:sensors.ping");
    assert_eq!(result.namespace, "sensors");
    assert!(result.scheduled_for.is_none());
    assert_eq!(result.clone().into_result().unwrap(), json!(42));

    assert!(scheduler.get_jobs(None, false).is_empty());
    assert_eq!(scheduler.get_history(None, Some("sensors"), 10).len(), 1);

    match scheduler.run_now("nope", TaskArgs::new()).await {
        Err(SchedulerError::TaskNotRegistered { name }) => assert_eq!(name, "nope"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(scheduler.get_history(None, None, 10).len(), 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl JobHook for Recorder {
    fn on_start(&self, job: &JobStart) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("start:{}", job.task_name));
        Ok(())
    }

    fn on_complete(&self, result: &JobResult) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("complete:{}", result.task_name));
        Ok(())
    }

    fn on_error(&self, result: &JobResult) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("error:{}", result.task_name));
        Ok(())
    }
}

struct Broken;

impl JobHook for Broken {
    fn on_start(&self, _job: &JobStart) -> anyhow::Result<()> {
        anyhow::bail!("hook down")
    }
}

#[tokio::test]
async fn hooks_observe_lifecycle_and_failures_are_swallowed() {
    let (scheduler, _clock) = manual_scheduler(1);
    register_counter(&scheduler, "ok");
    scheduler.register_task("bad", |_args: TaskArgs| async { Err::<Value, _>(anyhow::anyhow!("nope")) });

    let recorder = Arc::new(Recorder::default());
    scheduler.add_hook("broken", Arc::new(Broken), 0);
    scheduler.add_hook("recorder", recorder.clone(), 10);

    scheduler.run_now("ok", TaskArgs::new()).await.unwrap();
    let failed = scheduler.run_now("bad", TaskArgs::new()).await.unwrap();
    assert!(!failed.success);

    assert_eq!(*recorder.events.lock().unwrap(), ["start:ok", "complete:ok", "start:bad", "error:bad"]);

    scheduler.remove_hook("recorder");
    scheduler.run_now("ok", TaskArgs::new()).await.unwrap();
    assert_eq!(recorder.events.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn skip_if_running_drops_overlapping_occurrences() {
    let (scheduler, clock) = manual_scheduler(2);
    let gate = Arc::new(Semaphore::new(0));
    {
        let gate = gate.clone();
        scheduler.register_task("slow", move |_args: TaskArgs| {
            let gate = gate.clone();
            async move {
                let _permit = gate.acquire().await?;
                anyhow::Ok(Value::Null)
            }
        });
    }
    let id = scheduler
        .schedule_job(
            "slow",
            Schedule::Interval { every_secs: 10 },
            true,
            JobOptions::default().with_overlap(OverlapPolicy::SkipIfRunning),
        )
        .unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.tick().unwrap(), 1);
    clock.advance(Duration::seconds(10));
    assert_eq!(scheduler.tick().unwrap(), 0);

    let job = scheduler.get_job(&id).unwrap();
    assert_eq!(job.skipped_count, 1);
    assert_eq!(job.running, 1);
    assert_eq!(job.next_run, Some(t0() + Duration::seconds(20)));

    gate.add_permits(1);
    wait_for_history(&scheduler, 1).await;
    assert_eq!(scheduler.get_job(&id).unwrap().running, 0);

    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn stop_closes_the_pool() {
    let (scheduler, _clock) = manual_scheduler(1);
    register_counter(&scheduler, "t");
    scheduler.schedule_interval("t", 10, true).unwrap();

    // Stopping a scheduler that never started is a no-op.
    scheduler.stop(None).await.unwrap();
    assert!(matches!(scheduler.tick(), Err(SchedulerError::PoolClosed)));

    scheduler.start().unwrap();
    scheduler.start().unwrap();
    assert!(scheduler.is_running());

    scheduler.stop(Some(StdDuration::from_secs(1))).await.unwrap();
    assert!(!scheduler.is_running());
    assert!(matches!(scheduler.tick(), Err(SchedulerError::PoolClosed)));

    // The job is still due and fires once the scheduler is back.
    scheduler.start().unwrap();
    assert_eq!(scheduler.tick().unwrap(), 1);
    wait_for_history(&scheduler, 1).await;
    scheduler.stop(None).await.unwrap();
}

#[tokio::test]
async fn immediate_stop_drops_queued_work() {
    let (scheduler, _clock) = manual_scheduler(1);
    let gate = Arc::new(Semaphore::new(0));
    {
        let gate = gate.clone();
        scheduler.register_task("block", move |_args: TaskArgs| {
            let gate = gate.clone();
            async move {
                let _permit = gate.acquire().await?;
                anyhow::Ok(Value::Null)
            }
        });
    }
    let ids: Vec<String> = (0..3).map(|_| scheduler.schedule_interval("block", 60, true).unwrap()).collect();
    scheduler.start().unwrap();
    assert_eq!(scheduler.tick().unwrap(), 3);
    wait_until(|| scheduler.get_status().active_workers == 1).await;

    scheduler.stop(None).await.unwrap();
    gate.add_permits(3);

    // Only the in-flight run completes.
    wait_for_history(&scheduler, 1).await;
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(scheduler.get_history(None, None, 10).len(), 1);
    wait_until(|| ids.iter().all(|id| scheduler.get_job(id).unwrap().running == 0)).await;
}

#[test]
fn listing_status_and_export() {
    let (scheduler, _clock) = manual_scheduler(3);
    let args = TaskArgs::new().with_arg("bed-1").with_kwarg("depth_cm", 10);
    let soil = scheduler
        .schedule_job(
            "sensors.poll_soil",
            Schedule::Interval { every_secs: 30 },
            false,
            JobOptions::default().with_id("soil").with_args(args),
        )
        .unwrap();
    assert_eq!(soil, "soil");
    let report = scheduler.schedule_daily("maintenance.report", "06:30").unwrap();
    let paused = scheduler.schedule_interval("heartbeat", 5, false).unwrap();
    scheduler.disable_job(&paused).unwrap();

    let ids: Vec<String> = scheduler.get_jobs(None, false).into_iter().map(|j| j.job_id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(scheduler.get_jobs(Some("sensors"), false).len(), 1);
    assert_eq!(scheduler.get_jobs(None, true).len(), 2);
    assert!(scheduler.get_jobs(Some("nothing"), false).is_empty());

    let status = scheduler.get_status();
    assert!(!status.running);
    assert_eq!((status.total_jobs, status.enabled_jobs, status.pending_jobs), (3, 2, 2));
    assert_eq!(status.namespaces, ["default", "maintenance", "sensors"]);
    assert_eq!(status.max_workers, 3);

    let exported = scheduler.export_schedule_config();
    assert_eq!(exported.len(), 3);
    let entry = &exported["soil"];
    assert_eq!(entry.task, "sensors.poll_soil");
    assert_eq!(entry.args, [json!("bed-1")]);
    assert_eq!(entry.kwargs["depth_cm"], json!(10));

    let wire = serde_json::to_value(&exported).unwrap();
    assert_eq!(wire["soil"]["schedule"], json!({ "kind": "interval", "every_secs": 30 }));
    assert_eq!(wire[&report]["schedule"]["kind"], json!("daily"));

    // Export is a pure read.
    assert_eq!(scheduler.get_status().total_jobs, 3);

    let clash = scheduler.schedule_job(
        "other",
        Schedule::Interval { every_secs: 1 },
        false,
        JobOptions::default().with_id("soil"),
    );
    assert!(matches!(clash, Err(SchedulerError::Configuration(_))));
}

#[test]
fn install_from_job_specs() {
    let (scheduler, _clock) = manual_scheduler(1);
    let mut spec = JobSpec::new("sensors.poll_air", Schedule::Interval { every_secs: 15 });
    spec.id = Some("air".into());
    spec.start_immediately = true;
    spec.timeout_secs = Some(5);
    spec.args = TaskArgs::new().with_kwarg("zone", "greenhouse");

    let mut paused = JobSpec::new("maintenance.vacuum", Schedule::Interval { every_secs: 3600 });
    paused.enabled = false;
    paused.namespace = Some("ops".into());

    let ids = scheduler.install_all(&[spec, paused]).unwrap();
    assert_eq!(ids[0], "air");

    let air = scheduler.get_job("air").unwrap();
    assert_eq!(air.next_run, Some(t0()));
    assert_eq!(air.timeout_secs, Some(5));
    assert_eq!(air.args.kwarg("zone"), Some(&json!("greenhouse")));

    let vacuum = scheduler.get_job(&ids[1]).unwrap();
    assert!(!vacuum.enabled);
    assert_eq!(vacuum.namespace, "ops");
}
