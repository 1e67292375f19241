//! Per-job execution: maps each job kind onto the fetcher, the disk-image
//! installer, or an adapter call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{PackageManager, ShellRunner};
use crate::checksum;
use crate::dmg::{DmgInstaller, InstallStatus};
use crate::environment::Environment;
use crate::fetcher::{FetchOptions, RetryingFetcher};
use crate::job::{Job, JobError, JobFailure, JobRun, JobSpec};
use crate::retry::RetryPolicy;
use crate::storage;

/// Runs one job to completion on the calling thread.
///
/// Implementations resolve their own retries and never panic on job failure;
/// the batch executor turns whatever comes back into a `JobResult`.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &Job, env: &Environment) -> Result<JobRun, JobFailure>;
}

/// Settings shared by every job of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Default destination for disk-image apps.
    pub install_dir: PathBuf,
    pub fetch: FetchOptions,
    /// Re-run jobs whose target is already present.
    pub force: bool,
}

/// Executes jobs for real.
pub struct ProvisionRunner {
    packages: Arc<dyn PackageManager>,
    shell: Arc<dyn ShellRunner>,
    fetcher: RetryingFetcher,
    dmg: DmgInstaller,
    settings: RunSettings,
}

impl ProvisionRunner {
    pub fn new(
        packages: Arc<dyn PackageManager>,
        shell: Arc<dyn ShellRunner>,
        fetcher: RetryingFetcher,
        dmg: DmgInstaller,
        settings: RunSettings,
    ) -> Self {
        Self {
            packages,
            shell,
            fetcher,
            dmg,
            settings,
        }
    }

    fn fetch_options(&self, max_attempts: Option<u32>, backoff_secs: Option<f64>) -> FetchOptions {
        let base = self.settings.fetch;
        FetchOptions {
            retry: RetryPolicy {
                max_attempts: max_attempts.unwrap_or(base.retry.max_attempts),
                backoff: backoff_secs
                    .map(|s| Duration::from_secs_f64(s.max(0.0)))
                    .unwrap_or(base.retry.backoff),
            },
            timeouts: base.timeouts,
        }
    }

    /// Try each URL in order with a full attempt budget; attempts add up across URLs.
    fn download(
        &self,
        urls: &[String],
        destination: &Path,
        sha256: Option<&str>,
        opts: &FetchOptions,
    ) -> Result<JobRun, JobFailure> {
        if urls.is_empty() {
            return Err(JobFailure::new(
                JobError::Other("download has no URLs".to_string()),
                1,
            ));
        }
        let mut total_attempts = 0u32;
        let mut last: Option<JobError> = None;
        for (i, url) in urls.iter().enumerate() {
            if i > 0 {
                tracing::info!(url, "trying fallback URL");
            }
            match self.fetcher.fetch(url, destination, opts) {
                Ok(attempts) => {
                    total_attempts += attempts;
                    match verify(destination, sha256) {
                        Ok(()) => return Ok(JobRun::success(total_attempts)),
                        Err(e) => {
                            let _ = storage::remove_if_exists(destination);
                            last = Some(e);
                        }
                    }
                }
                Err(e) => {
                    total_attempts += e.attempts();
                    last = Some(JobError::Fetch(e));
                }
            }
        }
        let last = last.unwrap_or_else(|| JobError::Other("download failed".to_string()));
        let error = if urls.len() > 1 {
            JobError::AllUrlsFailed {
                tried: urls.len(),
                last: Box::new(last),
            }
        } else {
            last
        };
        Err(JobFailure::new(error, total_attempts))
    }
}

fn verify(path: &Path, expected: Option<&str>) -> Result<(), JobError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match checksum::verify_sha256(path, expected) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(actual)) => Err(JobError::Checksum {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        }),
        Err(e) => Err(JobError::Other(format!("checksum: {:#}", e))),
    }
}

impl JobRunner for ProvisionRunner {
    fn run(&self, job: &Job, env: &Environment) -> Result<JobRun, JobFailure> {
        let force = self.settings.force;
        match &job.spec {
            JobSpec::Package { package } => {
                self.packages
                    .install_package(package, env)
                    .map_err(|e| JobFailure::new(e, 1))?;
                Ok(JobRun::success(1))
            }
            JobSpec::Cask { cask, app } => {
                if let Some(app) = app {
                    if !force && self.packages.is_app_installed(app) {
                        return Ok(JobRun::skipped(format!("{} already installed", app)));
                    }
                }
                self.packages
                    .install_cask(cask, env)
                    .map_err(|e| JobFailure::new(e, 1))?;
                Ok(JobRun::success(1))
            }
            JobSpec::Download {
                urls,
                destination,
                sha256,
                max_attempts,
                backoff_secs,
            } => {
                if !force && destination.exists() {
                    return Ok(JobRun::skipped(format!(
                        "{} already present",
                        destination.display()
                    )));
                }
                let opts = self.fetch_options(*max_attempts, *backoff_secs);
                self.download(urls, destination, sha256.as_deref(), &opts)
            }
            JobSpec::Dmg {
                url,
                label,
                app,
                install_dir,
            } => {
                let dir = install_dir.as_deref().unwrap_or(&self.settings.install_dir);
                match self
                    .dmg
                    .install(url, label, app, dir, &self.settings.fetch, force)
                {
                    Ok(InstallStatus::Installed { attempts }) => Ok(JobRun::success(attempts)),
                    Ok(InstallStatus::AlreadyPresent) => {
                        Ok(JobRun::skipped(format!("{} already installed", app)))
                    }
                    Err(e) => {
                        let attempts = e.attempts;
                        Err(JobFailure::new(e, attempts))
                    }
                }
            }
            JobSpec::Shell { command, creates } => {
                if let Some(path) = creates {
                    if !force && path.exists() {
                        return Ok(JobRun::skipped(format!("{} already exists", path.display())));
                    }
                }
                let out = self
                    .shell
                    .run(command, env)
                    .map_err(|e| JobFailure::new(e, 1))?;
                tracing::debug!(job = %job.name, stdout = %out.stdout.trim(), "shell job finished");
                Ok(JobRun::success(1))
            }
        }
    }
}

/// Executes nothing; every job is reported as skipped with what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl JobRunner for DryRunRunner {
    fn run(&self, job: &Job, _env: &Environment) -> Result<JobRun, JobFailure> {
        Ok(JobRun::skipped(format!("dry run: {}", job.describe())))
    }
}
