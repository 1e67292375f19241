//! Disk-image application installer.
//!
//! One install runs `Idle → Downloaded → Mounted → Copied → Unmounted → Done`;
//! any step may end in `Failed(stage)`. Once the image is mounted, unmount and
//! image deletion always run, whether or not the copy succeeded.

mod copy;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::adapters::{DiskImageMounter, PackageManager};
use crate::fetcher::{FetchOptions, RetryingFetcher};
use crate::storage;

/// Step of a disk-image install that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Download,
    Mount,
    Copy,
    Unmount,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallStage::Download => "download",
            InstallStage::Mount => "mount",
            InstallStage::Copy => "copy",
            InstallStage::Unmount => "unmount",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DmgState {
    Idle,
    Downloaded,
    Mounted,
    Copied,
    Unmounted,
    Done,
    Failed(InstallStage),
}

#[derive(Debug, Error)]
#[error("{stage} failed: {reason}")]
pub struct InstallError {
    pub stage: InstallStage,
    pub reason: String,
    /// Download attempts made (0 when the download never started).
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed { attempts: u32 },
    AlreadyPresent,
}

/// Installs an `.app` bundle shipped inside a disk image.
#[derive(Clone)]
pub struct DmgInstaller {
    fetcher: RetryingFetcher,
    mounter: Arc<dyn DiskImageMounter>,
    packages: Arc<dyn PackageManager>,
    scratch_root: PathBuf,
}

struct Tracker<'a> {
    app: &'a str,
    state: DmgState,
}

impl Tracker<'_> {
    fn advance(&mut self, next: DmgState) {
        tracing::debug!(app = self.app, from = ?self.state, to = ?next, "dmg install");
        self.state = next;
    }

    fn fail(&mut self, stage: InstallStage, attempts: u32, reason: impl Into<String>) -> InstallError {
        self.advance(DmgState::Failed(stage));
        InstallError {
            stage,
            reason: reason.into(),
            attempts,
        }
    }
}

impl DmgInstaller {
    pub fn new(
        fetcher: RetryingFetcher,
        mounter: Arc<dyn DiskImageMounter>,
        packages: Arc<dyn PackageManager>,
    ) -> Self {
        Self {
            fetcher,
            mounter,
            packages,
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Directory under which per-install scratch directories are created.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Download, mount, copy `app_bundle_name` into `install_dir`, unmount, clean up.
    ///
    /// Returns `AlreadyPresent` without touching the network or the mounter when
    /// the app is already installed, unless `force` is set.
    pub fn install(
        &self,
        image_url: &str,
        image_label: &str,
        app_bundle_name: &str,
        install_dir: &Path,
        fetch: &FetchOptions,
        force: bool,
    ) -> Result<InstallStatus, InstallError> {
        let mut t = Tracker {
            app: app_bundle_name,
            state: DmgState::Idle,
        };
        let target = install_dir.join(app_bundle_name);
        if !force && (self.packages.is_app_installed(app_bundle_name) || target.exists()) {
            tracing::info!(app = app_bundle_name, "already installed; skipping");
            return Ok(InstallStatus::AlreadyPresent);
        }

        let scratch = tempfile::Builder::new()
            .prefix("macboot-dmg-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| t.fail(InstallStage::Download, 0, format!("scratch dir: {}", e)))?;
        let image = scratch.path().join(image_file_name(image_label));

        let attempts = self
            .fetcher
            .fetch(image_url, &image, fetch)
            .map_err(|e| t.fail(InstallStage::Download, e.attempts(), e.to_string()))?;
        t.advance(DmgState::Downloaded);

        let mount = match self.mounter.mount(&image) {
            Ok(m) => m,
            Err(e) => {
                remove_image(&image);
                return Err(t.fail(InstallStage::Mount, attempts, e.to_string()));
            }
        };
        t.advance(DmgState::Mounted);
        if mount.path.file_name().map(|n| n != image_label).unwrap_or(true) {
            tracing::warn!(
                label = image_label,
                mount = %mount.path.display(),
                "volume mounted under an unexpected name"
            );
        }

        let copied = copy::copy_bundle(&mount.path.join(app_bundle_name), &target, force);
        if copied.is_ok() {
            t.advance(DmgState::Copied);
        }

        // Cleanup is scoped to "mount succeeded", not to overall success.
        let unmounted = self.mounter.unmount(&mount);
        remove_image(&image);
        drop(scratch);

        match (copied, unmounted) {
            (Err(e), unmounted) => {
                if let Err(u) = unmounted {
                    tracing::warn!(mount = %mount.path.display(), "unmount after failed copy: {}", u);
                }
                Err(t.fail(InstallStage::Copy, attempts, e.to_string()))
            }
            (Ok(()), Err(e)) => Err(t.fail(InstallStage::Unmount, attempts, e.to_string())),
            (Ok(()), Ok(())) => {
                t.advance(DmgState::Unmounted);
                t.advance(DmgState::Done);
                tracing::info!(app = app_bundle_name, dir = %install_dir.display(), "installed");
                Ok(InstallStatus::Installed { attempts })
            }
        }
    }
}

fn image_file_name(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "image.dmg".to_string()
    } else {
        format!("{}.dmg", cleaned)
    }
}

fn remove_image(image: &Path) {
    if let Err(e) = storage::remove_if_exists(image) {
        tracing::warn!(path = %image.display(), "could not remove disk image: {}", e);
    }
}
