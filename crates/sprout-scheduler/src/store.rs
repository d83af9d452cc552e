use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sprout_core::{OverlapPolicy, Schedule, TaskArgs};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::index::DueIndex;
use crate::schedule::{initial_next_run, next_run_after};
use crate::types::{JobResult, ScheduledJob};

/// One occurrence handed from the clock loop to the execution pool.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub job_id: String,
    pub task_name: String,
    pub namespace: String,
    pub args: TaskArgs,
    pub scheduled_for: DateTime<Utc>,
    pub timeout_secs: Option<u64>,
    /// Store generation of the job record this occurrence was taken from.
    pub generation: u64,
}

/// Job records plus the due-job index.
///
/// The two are always mutated together (insert + push, pop + reschedule), so
/// callers guard the whole store with a single mutex.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<String, ScheduledJob>,
    index: DueIndex,
    /// Bumped on every insert; outcomes carrying an older value belong to a
    /// removed record that shared the id.
    generations: HashMap<String, u64>,
    next_generation: u64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new job and index its first firing. Rejects duplicate ids.
    pub fn insert(&mut self, job: ScheduledJob) -> Result<()> {
        if self.jobs.contains_key(&job.job_id) {
            return Err(SchedulerError::Configuration(format!(
                "job id already in use: {}",
                job.job_id
            )));
        }
        if job.enabled {
            if let Some(at) = job.next_run {
                self.index.push(at, &job.job_id);
            }
        }
        self.next_generation += 1;
        self.generations.insert(job.job_id.clone(), self.next_generation);
        self.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledJob> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &ScheduledJob> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Raw index size, stale entries included.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Drop the job. Its index entries go stale and are discarded on pop.
    pub fn remove(&mut self, id: &str) -> Result<ScheduledJob> {
        let job = self
            .jobs
            .remove(id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })?;
        self.generations.remove(id);
        Ok(job)
    }

    /// Mutable record of `id`, provided it is still the generation `generation`.
    fn current_mut(&mut self, id: &str, generation: u64) -> Option<&mut ScheduledJob> {
        if self.generations.get(id) != Some(&generation) {
            return None;
        }
        self.jobs.get_mut(id)
    }

    /// Re-arm a job. A null `next_run` is recomputed relative to `now`.
    ///
    /// An entry is always pushed: the previous one may have been popped and
    /// discarded while the job was disabled. Any duplicate left behind fails
    /// the timestamp check once the first one fires.
    ///
    /// A one-shot that has already fired stays disabled and is rejected.
    pub fn enable(&mut self, id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })?;
        if is_spent_once(job) {
            return Err(SchedulerError::Configuration(format!(
                "one-shot job has already fired: {id}"
            )));
        }
        job.enabled = true;
        let next = *job.next_run.get_or_insert_with(|| initial_next_run(&job.schedule, now, false));
        self.index.push(next, id);
        Ok(next)
    }

    /// Leaves `next_run` alone; the lazy-deletion check keeps it from firing.
    pub fn disable(&mut self, id: &str) -> Result<()> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })?;
        job.enabled = false;
        Ok(())
    }

    /// Pop every due entry, discard the stale ones, and reschedule the rest.
    ///
    /// Each live job gets its new `next_run` committed and re-indexed before
    /// its occurrence is returned for dispatch, so a slow execution can never
    /// hold up its own next firing and no entry is consumed twice.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Dispatch> {
        let mut due = Vec::new();

        while let Some(entry) = self.index.pop_due(now) {
            let Some(job) = self.jobs.get_mut(&entry.job_id) else {
                debug!(job_id = %entry.job_id, "discarding index entry of removed job");
                continue;
            };
            if !job.enabled || job.next_run != Some(entry.run_at) {
                debug!(job_id = %entry.job_id, run_at = %entry.run_at, "discarding stale index entry");
                continue;
            }

            let scheduled_for = entry.run_at;
            job.next_run = next_run_after(&job.schedule, scheduled_for, now);
            match job.next_run {
                Some(next) => {
                    self.index.push(next, &job.job_id);
                }
                None => {
                    // Spent one-shot.
                    job.enabled = false;
                }
            }

            if job.overlap == OverlapPolicy::SkipIfRunning && job.running > 0 {
                job.skipped_count += 1;
                debug!(job_id = %job.job_id, %scheduled_for, "previous run still in flight, occurrence skipped");
                continue;
            }

            job.running += 1;
            let generation = self.generations.get(&job.job_id).copied().unwrap_or_default();
            due.push(Dispatch {
                job_id: job.job_id.clone(),
                task_name: job.task_name.clone(),
                namespace: job.namespace.clone(),
                args: job.args.clone(),
                scheduled_for,
                timeout_secs: job.timeout_secs,
                generation,
            });
        }

        due
    }

    /// Fold a finished execution into the job's counters. A job removed while
    /// its run was in flight is ignored, as is any later job reusing its id.
    pub fn record_outcome(&mut self, result: &JobResult, generation: u64) {
        let Some(job) = self.current_mut(&result.job_id, generation) else {
            debug!(job_id = %result.job_id, "outcome of a removed job record ignored");
            return;
        };
        job.running = job.running.saturating_sub(1);
        job.run_count += 1;
        job.last_run = Some(result.started_at);
        if result.success {
            job.success_count += 1;
            job.last_error = None;
        } else {
            job.failure_count += 1;
            job.last_error = result.error.clone();
        }
    }

    /// Undo the in-flight mark of an occurrence that never reached a worker.
    pub fn release(&mut self, dispatch: &Dispatch) {
        if let Some(job) = self.current_mut(&dispatch.job_id, dispatch.generation) {
            job.running = job.running.saturating_sub(1);
        }
    }

    /// Put back an occurrence the pool refused, as if it had never been
    /// taken: `next_run` returns to its scheduled instant and is re-indexed.
    pub fn restore(&mut self, dispatch: &Dispatch) {
        let Some(job) = self.current_mut(&dispatch.job_id, dispatch.generation) else {
            return;
        };
        job.running = job.running.saturating_sub(1);
        if job.next_run.is_none() {
            if !matches!(job.schedule, Schedule::Once { .. }) {
                return;
            }
            job.enabled = true;
        }
        job.next_run = Some(dispatch.scheduled_for);
        self.index.push(dispatch.scheduled_for, &dispatch.job_id);
    }

    /// Enabled jobs that will fire again, computed from the records rather
    /// than the index, which may hold stale duplicates.
    pub fn pending_count(&self) -> usize {
        self.jobs.values().filter(|j| j.is_pending()).count()
    }

    pub fn namespaces(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.jobs.values().map(|j| j.namespace.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }
}

/// A one-shot whose single occurrence was taken and has run or is running.
fn is_spent_once(job: &ScheduledJob) -> bool {
    matches!(job.schedule, Schedule::Once { .. })
        && job.next_run.is_none()
        && (job.run_count > 0 || job.running > 0)
}
