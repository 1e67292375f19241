//! Jobs and their results.
//!
//! A `Job` is one unit of provisioning work with a single pass/fail outcome.
//! Every job that enters a batch produces exactly one `JobResult`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::AdapterError;
use crate::dmg::InstallError;
use crate::fetcher::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    PackageInstall,
    CaskInstall,
    Download,
    DmgInstall,
    Shell,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::PackageInstall => "package",
            JobKind::CaskInstall => "cask",
            JobKind::Download => "download",
            JobKind::DmgInstall => "dmg",
            JobKind::Shell => "shell",
        };
        f.write_str(s)
    }
}

/// Kind-specific job parameters, tagged by `kind` in plan files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    Package {
        package: String,
    },
    Cask {
        cask: String,
        /// Bundle name (e.g. `Firefox.app`); when present and installed, the job is skipped.
        #[serde(default)]
        app: Option<String>,
    },
    Download {
        /// Primary URL followed by fallbacks, tried in order.
        urls: Vec<String>,
        destination: PathBuf,
        #[serde(default)]
        sha256: Option<String>,
        #[serde(default)]
        max_attempts: Option<u32>,
        #[serde(default)]
        backoff_secs: Option<f64>,
    },
    Dmg {
        url: String,
        /// Volume name the image mounts as.
        label: String,
        app: String,
        #[serde(default)]
        install_dir: Option<PathBuf>,
    },
    Shell {
        command: String,
        /// Path the command produces; if it exists, the job is skipped.
        #[serde(default)]
        creates: Option<PathBuf>,
    },
}

impl JobSpec {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Package { .. } => JobKind::PackageInstall,
            JobSpec::Cask { .. } => JobKind::CaskInstall,
            JobSpec::Download { .. } => JobKind::Download,
            JobSpec::Dmg { .. } => JobKind::DmgInstall,
            JobSpec::Shell { .. } => JobKind::Shell,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(flatten)]
    pub spec: JobSpec,
}

impl Job {
    pub fn new(name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn package(name: &str) -> Self {
        Self::new(
            name,
            JobSpec::Package {
                package: name.to_string(),
            },
        )
    }

    pub fn cask(name: &str) -> Self {
        Self::new(
            name,
            JobSpec::Cask {
                cask: name.to_string(),
                app: None,
            },
        )
    }

    pub fn kind(&self) -> JobKind {
        self.spec.kind()
    }

    /// One-line description of what running the job does.
    pub fn describe(&self) -> String {
        match &self.spec {
            JobSpec::Package { package } => format!("brew install {}", package),
            JobSpec::Cask { cask, .. } => format!("brew install --cask {}", cask),
            JobSpec::Download {
                urls, destination, ..
            } => {
                let first = urls.first().map(String::as_str).unwrap_or("<no url>");
                let extra = if urls.len() > 1 {
                    format!(" (+{} fallback)", urls.len() - 1)
                } else {
                    String::new()
                };
                format!("download {}{} -> {}", first, extra, destination.display())
            }
            JobSpec::Dmg {
                url, app, install_dir, ..
            } => match install_dir {
                Some(dir) => format!("install {} from {} into {}", app, url, dir.display()),
                None => format!("install {} from {}", app, url),
            },
            JobSpec::Shell { command, .. } => format!("sh: {}", command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Success => "ok",
            JobOutcome::Failed => "failed",
            JobOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("download: {0}")]
    Fetch(#[from] FetchError),
    #[error("download: all {tried} URLs failed; last: {last}")]
    AllUrlsFailed { tried: usize, last: Box<JobError> },
    #[error("dmg {0}")]
    Install(#[from] InstallError),
    #[error("{0}")]
    Adapter(#[from] AdapterError),
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("{0}")]
    Other(String),
}

/// A job that ran to completion (or was skipped on purpose).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub outcome: JobOutcome,
    pub attempts: u32,
    pub note: Option<String>,
}

impl JobRun {
    pub fn success(attempts: u32) -> Self {
        Self {
            outcome: JobOutcome::Success,
            attempts: attempts.max(1),
            note: None,
        }
    }

    /// Skipped jobs count the presence check as their single attempt.
    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            outcome: JobOutcome::Skipped,
            attempts: 1,
            note: Some(note.into()),
        }
    }
}

#[derive(Debug)]
pub struct JobFailure {
    pub error: JobError,
    pub attempts: u32,
}

impl JobFailure {
    pub fn new(error: impl Into<JobError>, attempts: u32) -> Self {
        Self {
            error: error.into(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job: Job,
    pub outcome: JobOutcome,
    /// Always at least 1.
    pub attempts: u32,
    pub error: Option<String>,
    pub note: Option<String>,
}

impl JobResult {
    pub fn from_run(job: Job, run: Result<JobRun, JobFailure>) -> Self {
        match run {
            Ok(r) => Self {
                job,
                outcome: r.outcome,
                attempts: r.attempts.max(1),
                error: None,
                note: r.note,
            },
            Err(f) => Self::failed(job, f.attempts, f.error.to_string()),
        }
    }

    pub fn failed(job: Job, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            job,
            outcome: JobOutcome::Failed,
            attempts: attempts.max(1),
            error: Some(error.into()),
            note: None,
        }
    }

    /// Result for a job left behind when its phase stopped early.
    pub fn not_run(job: Job, why: &str) -> Self {
        Self {
            job,
            outcome: JobOutcome::Skipped,
            attempts: 1,
            error: None,
            note: Some(format!("not run: {}", why)),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == JobOutcome::Failed
    }
}
