//! Run report: every job result of every phase, plus post-run steps.

use std::fmt::Write as _;

use serde::Serialize;

use crate::job::{JobOutcome, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Every job succeeded or was skipped.
    Succeeded,
    /// Some jobs failed in a phase that tolerates failures.
    CompletedWithFailures,
    /// A job failed in an abort-on-failure phase; the run stopped here.
    Aborted,
    /// Never started because an earlier phase aborted.
    NotRun,
}

impl PhaseStatus {
    fn label(self) -> &'static str {
        match self {
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::CompletedWithFailures => "completed with failures",
            PhaseStatus::Aborted => "aborted",
            PhaseStatus::NotRun => "not run",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub abort_on_failure: bool,
    pub status: PhaseStatus,
    /// Jobs the phase declares, whether or not they ran.
    pub planned_jobs: usize,
    pub results: Vec<JobResult>,
}

impl PhaseReport {
    pub fn count(&self, outcome: JobOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Config,
    Preference,
    Restart,
}

/// Outcome of a post-run step (config file, preference, app restart).
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub kind: StepKind,
    pub name: String,
    pub outcome: JobOutcome,
    pub error: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Append-only record of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    phases: Vec<PhaseReport>,
    steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_phase(&mut self, phase: PhaseReport) {
        self.phases.push(phase);
    }

    pub fn push_steps(&mut self, steps: impl IntoIterator<Item = StepRecord>) {
        self.steps.extend(steps);
    }

    pub fn phases(&self) -> &[PhaseReport] {
        &self.phases
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Job totals across all phases (post-run steps are not jobs).
    pub fn totals(&self) -> Totals {
        self.phases
            .iter()
            .flat_map(|p| p.results.iter())
            .fold(Totals::default(), |mut t, r| {
                t.jobs += 1;
                match r.outcome {
                    JobOutcome::Success => t.succeeded += 1,
                    JobOutcome::Failed => t.failed += 1,
                    JobOutcome::Skipped => t.skipped += 1,
                }
                t
            })
    }

    pub fn aborted(&self) -> bool {
        self.phases.iter().any(|p| p.status == PhaseStatus::Aborted)
    }

    /// 0 only when every abort-on-failure phase fully succeeded.
    pub fn exit_code(&self) -> i32 {
        let fatal = self.phases.iter().any(|p| {
            p.abort_on_failure && !matches!(p.status, PhaseStatus::Succeeded)
        });
        if fatal {
            1
        } else {
            0
        }
    }

    /// Human-readable summary: one line per job, failures with their reason.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for p in &self.phases {
            let _ = writeln!(
                out,
                "== {} [{}] ({} ok, {} failed, {} skipped of {})",
                p.name,
                p.status.label(),
                p.count(JobOutcome::Success),
                p.count(JobOutcome::Failed),
                p.count(JobOutcome::Skipped),
                p.planned_jobs
            );
            for r in &p.results {
                let _ = write!(
                    out,
                    "  {:<8} {:<9} {:<28} attempts={}",
                    r.outcome.to_string(),
                    r.job.kind().to_string(),
                    r.job.name,
                    r.attempts
                );
                if let Some(e) = &r.error {
                    let _ = write!(out, "  error: {}", e);
                } else if let Some(n) = &r.note {
                    let _ = write!(out, "  ({})", n);
                }
                out.push('\n');
            }
        }
        if !self.steps.is_empty() {
            let _ = writeln!(out, "== post-run steps");
            for s in &self.steps {
                let kind = match s.kind {
                    StepKind::Config => "config",
                    StepKind::Preference => "pref",
                    StepKind::Restart => "restart",
                };
                let _ = write!(out, "  {:<8} {:<9} {}", s.outcome.to_string(), kind, s.name);
                if let Some(e) = &s.error {
                    let _ = write!(out, "  error: {}", e);
                } else if let Some(n) = &s.note {
                    let _ = write!(out, "  ({})", n);
                }
                out.push('\n');
            }
        }
        let t = self.totals();
        let _ = writeln!(
            out,
            "total: {} jobs, {} succeeded, {} failed, {} skipped",
            t.jobs, t.succeeded, t.failed, t.skipped
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobResult, JobRun};

    fn ok(name: &str) -> JobResult {
        JobResult::from_run(Job::package(name), Ok(JobRun::success(1)))
    }

    fn phase(name: &str, abort: bool, status: PhaseStatus, results: Vec<JobResult>) -> PhaseReport {
        PhaseReport {
            name: name.into(),
            abort_on_failure: abort,
            status,
            planned_jobs: results.len(),
            results,
        }
    }

    #[test]
    fn totals_and_exit_code() {
        let mut report = RunReport::new();
        report.push_phase(phase("brew", true, PhaseStatus::Succeeded, vec![ok("git")]));
        report.push_phase(phase(
            "apps",
            false,
            PhaseStatus::CompletedWithFailures,
            vec![
                ok("slack"),
                JobResult::failed(Job::cask("zoom"), 1, "no such cask"),
                JobResult::from_run(Job::cask("iterm2"), Ok(JobRun::skipped("present"))),
            ],
        ));
        assert_eq!(
            report.totals(),
            Totals {
                jobs: 4,
                succeeded: 2,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(report.exit_code(), 0, "non-fatal failures keep exit code 0");
        assert!(!report.aborted());
    }

    #[test]
    fn aborted_phase_sets_nonzero_exit() {
        let mut report = RunReport::new();
        report.push_phase(phase(
            "brew",
            true,
            PhaseStatus::Aborted,
            vec![JobResult::failed(Job::package("git"), 1, "boom")],
        ));
        report.push_phase(phase("apps", false, PhaseStatus::NotRun, vec![]));
        assert!(report.aborted());
        assert_eq!(report.exit_code(), 1);
        let text = report.render();
        assert!(text.contains("== brew [aborted]"));
        assert!(text.contains("== apps [not run]"));
        assert!(text.contains("error: boom"));
        assert!(text.contains("total: 1 jobs, 0 succeeded, 1 failed, 0 skipped"));
    }

    #[test]
    fn report_serializes_to_json() {
        let mut report = RunReport::new();
        report.push_phase(phase("brew", true, PhaseStatus::Succeeded, vec![ok("git")]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phases"][0]["status"], "succeeded");
        assert_eq!(json["phases"][0]["results"][0]["job"]["kind"], "package");
        assert_eq!(json["phases"][0]["results"][0]["outcome"], "success");
    }
}
