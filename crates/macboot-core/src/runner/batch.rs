//! Run a list of independent jobs in groups bounded by a concurrency cap.
//!
//! Jobs in a group run concurrently on the blocking pool; the next group starts
//! only after every member of the current one has resolved. Results come back
//! in input order, and a failing or panicking job never cancels its siblings.

use std::ops::Range;
use std::sync::Arc;

use crate::environment::Environment;
use crate::job::{Job, JobResult};

use super::exec::JobRunner;

/// Split `len` jobs into consecutive groups of at most `cap` (cap 0 is treated as 1).
pub fn plan_groups(len: usize, cap: usize) -> Vec<Range<usize>> {
    let cap = cap.max(1);
    (0..len)
        .step_by(cap)
        .map(|start| start..(start + cap).min(len))
        .collect()
}

#[derive(Clone)]
pub struct BatchExecutor {
    runner: Arc<dyn JobRunner>,
}

impl BatchExecutor {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner }
    }

    /// Run `jobs` with at most `concurrency_cap` in flight. Never fails as a whole;
    /// the i-th result belongs to the i-th job.
    pub async fn run(
        &self,
        jobs: &[Job],
        concurrency_cap: usize,
        env: &Environment,
    ) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(jobs.len());
        for group in plan_groups(jobs.len(), concurrency_cap) {
            tracing::debug!(start = group.start, size = group.len(), "starting job group");
            let handles: Vec<_> = jobs[group]
                .iter()
                .map(|job| {
                    let runner = Arc::clone(&self.runner);
                    let owned = job.clone();
                    let env = env.clone();
                    let handle = tokio::task::spawn_blocking(move || {
                        let run = runner.run(&owned, &env);
                        JobResult::from_run(owned, run)
                    });
                    (job, handle)
                })
                .collect();

            for (job, handle) in handles {
                let result = match handle.await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!(job = %job.name, "job task join: {}", e);
                        JobResult::failed(job.clone(), 1, format!("job task aborted: {}", e))
                    }
                };
                log_result(&result);
                results.push(result);
            }
        }
        results
    }
}

fn log_result(r: &JobResult) {
    match &r.error {
        Some(err) => tracing::warn!(
            job = %r.job.name,
            kind = %r.job.kind(),
            attempts = r.attempts,
            "job failed: {}",
            err
        ),
        None => tracing::info!(
            job = %r.job.name,
            kind = %r.job.kind(),
            attempts = r.attempts,
            outcome = %r.outcome,
            "job finished"
        ),
    }
}
