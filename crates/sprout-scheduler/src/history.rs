use std::collections::VecDeque;

use crate::types::JobResult;

/// Bounded ring of completed results; the oldest entry is evicted first.
#[derive(Debug)]
pub struct History {
    results: VecDeque<JobResult>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { results: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, result: JobResult) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Newest-first results matching the optional filters, at most `limit`.
    pub fn query(&self, job_id: Option<&str>, namespace: Option<&str>, limit: usize) -> Vec<JobResult> {
        self.results
            .iter()
            .rev()
            .filter(|r| job_id.map_or(true, |id| r.job_id == id))
            .filter(|r| namespace.map_or(true, |ns| r.namespace == ns))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Failure statistics over the `window` most recent results.
    pub fn window_stats(&self, window: usize) -> WindowStats {
        let considered = self.results.len().min(window);
        let failures = self.results.iter().rev().take(considered).filter(|r| !r.success).count();
        WindowStats { considered, failures }
    }
}

/// Counts over the most recent slice of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub considered: usize,
    pub failures: usize,
}

impl WindowStats {
    /// Fraction of failed runs; zero when nothing has run yet.
    pub fn failure_rate(&self) -> f64 {
        if self.considered == 0 {
            return 0.0;
        }
        self.failures as f64 / self.considered as f64
    }
}
