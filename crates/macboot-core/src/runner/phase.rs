//! Sequential phases of batches, with a per-phase abort policy.

use std::path::PathBuf;

use crate::environment::Environment;
use crate::job::{Job, JobResult};

use super::batch::BatchExecutor;
use super::report::{PhaseReport, PhaseStatus, RunReport};

/// Jobs executed under one concurrency cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Cap for this batch; falls back to the runner default.
    pub concurrency: Option<usize>,
    pub jobs: Vec<Job>,
}

/// An ordered stage of the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phase {
    pub name: String,
    /// Stop the whole run if any job in this phase fails.
    pub abort_on_failure: bool,
    /// PATH entries later phases see once this phase has run.
    pub path_prepend: Vec<PathBuf>,
    pub batches: Vec<Batch>,
}

impl Phase {
    pub fn job_count(&self) -> usize {
        self.batches.iter().map(|b| b.jobs.len()).sum()
    }
}

pub struct PhaseRunner {
    executor: BatchExecutor,
    default_cap: usize,
    cap_override: Option<usize>,
}

impl PhaseRunner {
    pub fn new(executor: BatchExecutor, default_cap: usize) -> Self {
        Self {
            executor,
            default_cap: default_cap.max(1),
            cap_override: None,
        }
    }

    /// Force every batch to use `cap` (e.g. from `--concurrency`).
    pub fn with_cap_override(mut self, cap: Option<usize>) -> Self {
        self.cap_override = cap.map(|c| c.max(1));
        self
    }

    fn cap_for(&self, batch: &Batch) -> usize {
        self.cap_override
            .or(batch.concurrency)
            .unwrap_or(self.default_cap)
            .max(1)
    }

    /// Run `phases` in order. Returns the report and the environment after the last phase that ran.
    pub async fn run(&self, phases: &[Phase], env: Environment) -> (RunReport, Environment) {
        let mut report = RunReport::new();
        let mut env = env;
        let mut aborted = false;

        for phase in phases {
            if aborted {
                tracing::info!(phase = %phase.name, "not run (earlier phase aborted)");
                report.push_phase(PhaseReport {
                    name: phase.name.clone(),
                    abort_on_failure: phase.abort_on_failure,
                    status: PhaseStatus::NotRun,
                    planned_jobs: phase.job_count(),
                    results: Vec::new(),
                });
                continue;
            }

            tracing::info!(phase = %phase.name, jobs = phase.job_count(), "phase started");
            let mut results = Vec::with_capacity(phase.job_count());
            let mut stopped = false;
            for batch in &phase.batches {
                if stopped {
                    results.extend(
                        batch
                            .jobs
                            .iter()
                            .map(|job| JobResult::not_run(job.clone(), "earlier batch failed")),
                    );
                    continue;
                }
                let batch_results = self
                    .executor
                    .run(&batch.jobs, self.cap_for(batch), &env)
                    .await;
                let batch_failed = batch_results.iter().any(|r| r.is_failed());
                results.extend(batch_results);
                stopped = batch_failed && phase.abort_on_failure;
            }

            let failed = results.iter().filter(|r| r.is_failed()).count();
            let status = match (failed, phase.abort_on_failure) {
                (0, _) => PhaseStatus::Succeeded,
                (_, true) => PhaseStatus::Aborted,
                (_, false) => PhaseStatus::CompletedWithFailures,
            };
            match status {
                PhaseStatus::Aborted => {
                    tracing::error!(phase = %phase.name, failed, "phase failed; aborting run");
                    aborted = true;
                }
                _ => {
                    tracing::info!(phase = %phase.name, failed, "phase finished");
                    if !phase.path_prepend.is_empty() {
                        env = env.with_path_prepended(&phase.path_prepend);
                    }
                }
            }

            report.push_phase(PhaseReport {
                name: phase.name.clone(),
                abort_on_failure: phase.abort_on_failure,
                status,
                planned_jobs: phase.job_count(),
                results,
            });
        }

        (report, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobError, JobFailure, JobOutcome, JobRun};
    use crate::runner::exec::JobRunner;
    use std::sync::{Arc, Mutex};

    /// Fails jobs whose name starts with "bad"; records job names and the PATH they saw.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Vec<PathBuf>)>>,
    }

    impl JobRunner for Recorder {
        fn run(&self, job: &Job, env: &Environment) -> Result<JobRun, JobFailure> {
            self.seen
                .lock()
                .unwrap()
                .push((job.name.clone(), env.path().to_vec()));
            if job.name.starts_with("bad") {
                return Err(JobFailure::new(JobError::Other("nope".into()), 1));
            }
            Ok(JobRun::success(1))
        }
    }

    fn phase(name: &str, abort: bool, jobs: &[&str]) -> Phase {
        Phase {
            name: name.into(),
            abort_on_failure: abort,
            path_prepend: Vec::new(),
            batches: vec![Batch {
                concurrency: None,
                jobs: jobs.iter().map(|j| Job::package(j)).collect(),
            }],
        }
    }

    fn runner(rec: Arc<Recorder>) -> PhaseRunner {
        PhaseRunner::new(BatchExecutor::new(rec), 4)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_marks_remaining_phases_not_run() {
        let rec = Arc::new(Recorder::default());
        let phases = vec![
            phase("A", true, &["ok", "bad"]),
            phase("B", false, &["b1"]),
            phase("C", false, &["c1"]),
        ];
        let (report, _) = runner(rec.clone()).run(&phases, Environment::default()).await;
        let statuses: Vec<PhaseStatus> = report.phases().iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![PhaseStatus::Aborted, PhaseStatus::NotRun, PhaseStatus::NotRun]
        );
        assert_ne!(report.exit_code(), 0);
        let names: Vec<String> = rec.seen.lock().unwrap().iter().map(|s| s.0.clone()).collect();
        assert!(!names.contains(&"b1".to_string()));
        assert_eq!(report.phase("B").unwrap().planned_jobs, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_fatal_failures_continue() {
        let rec = Arc::new(Recorder::default());
        let phases = vec![
            phase("apps", false, &["bad-cask", "good-cask"]),
            phase("fonts", true, &["font"]),
        ];
        let (report, _) = runner(rec).run(&phases, Environment::default()).await;
        assert_eq!(report.phases()[0].status, PhaseStatus::CompletedWithFailures);
        assert_eq!(report.phases()[1].status, PhaseStatus::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.totals().failed, 1);
        assert_eq!(report.phases()[0].results[1].outcome, JobOutcome::Success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_skips_later_batches_of_same_phase() {
        let rec = Arc::new(Recorder::default());
        let mut p = phase("bootstrap", true, &["bad"]);
        p.batches.push(Batch {
            concurrency: Some(1),
            jobs: vec![Job::package("after")],
        });
        let (report, _) = runner(rec.clone()).run(&[p], Environment::default()).await;
        let results = &report.phases()[0].results;
        assert_eq!(results.len(), 2);
        assert_eq!(report.phases()[0].planned_jobs, 2);
        assert_eq!(results[1].job.name, "after");
        assert_eq!(results[1].outcome, JobOutcome::Skipped);
        assert_eq!(
            results[1].note.as_deref(),
            Some("not run: earlier batch failed")
        );
        assert_eq!(report.phases()[0].status, PhaseStatus::Aborted);
        assert_eq!(rec.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn path_prepend_reaches_later_phases_only() {
        let rec = Arc::new(Recorder::default());
        let mut first = phase("package-manager", true, &["install-brew"]);
        first.path_prepend = vec![PathBuf::from("/opt/homebrew/bin")];
        let phases = vec![first, phase("tools", false, &["git"])];
        let env = Environment::default().with_path_prepended(["/usr/bin"]);
        let (_, final_env) = runner(rec.clone()).run(&phases, env).await;

        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen[0].1, vec![PathBuf::from("/usr/bin")]);
        assert_eq!(
            seen[1].1,
            vec![PathBuf::from("/opt/homebrew/bin"), PathBuf::from("/usr/bin")]
        );
        assert_eq!(final_env.path()[0], PathBuf::from("/opt/homebrew/bin"));
    }

    #[test]
    fn cap_override_wins_over_batch_cap() {
        let r = runner(Arc::new(Recorder::default()));
        let b = Batch {
            concurrency: Some(8),
            jobs: vec![],
        };
        assert_eq!(r.cap_for(&b), 8);
        assert_eq!(r.cap_for(&Batch::default()), 4);
        let r = r.with_cap_override(Some(2));
        assert_eq!(r.cap_for(&b), 2);
    }
}
