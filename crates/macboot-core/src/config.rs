use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Download retry parameters (optional section in config.toml).
/// Individual download jobs in the plan may override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per URL (including the first).
    pub max_attempts: u32,
    /// Fixed delay in seconds between attempts.
    pub backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_secs_f64(self.backoff_secs.max(0.0)),
        }
    }
}

/// Transfer timeouts applied to every fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connect timeout in seconds.
    pub connect_secs: u64,
    /// Whole-transfer timeout in seconds.
    pub total_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            total_secs: 900,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }
}

/// Global configuration loaded from `~/.config/macboot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacbootConfig {
    /// Default per-batch concurrency cap (overridden by `--concurrency`).
    pub concurrency: usize,
    /// Where disk-image applications are copied to.
    pub install_dir: PathBuf,
    /// Directories searched when deciding whether an app bundle is already installed.
    #[serde(default = "default_app_dirs")]
    pub app_dirs: Vec<PathBuf>,
    /// Package manager executable (name on PATH or absolute path).
    #[serde(default = "default_brew_path")]
    pub brew_path: String,
    /// Plan file; if missing, `plan.toml` next to config.toml is used.
    #[serde(default)]
    pub plan_path: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_app_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/Applications")]
}

fn default_brew_path() -> String {
    "brew".to_string()
}

impl Default for MacbootConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            install_dir: PathBuf::from("/Applications"),
            app_dirs: default_app_dirs(),
            brew_path: default_brew_path(),
            plan_path: None,
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl MacbootConfig {
    /// Application directories including `install_dir`, without duplicates.
    pub fn effective_app_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.app_dirs.clone();
        if !dirs.contains(&self.install_dir) {
            dirs.push(self.install_dir.clone());
        }
        dirs
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("macboot")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default plan location: `~/.config/macboot/plan.toml`.
pub fn default_plan_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("macboot")?;
    Ok(xdg_dirs.get_config_home().join("plan.toml"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MacbootConfig> {
    let path = config_path()?;
    if let Some(cfg) = load_from(&path)? {
        return Ok(cfg);
    }
    let default_cfg = MacbootConfig::default();
    let toml = toml::to_string_pretty(&default_cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, toml)?;
    tracing::info!("created default config at {}", path.display());
    Ok(default_cfg)
}

/// Load configuration without touching the filesystem: defaults when no
/// config file exists yet.
pub fn load_or_default() -> Result<MacbootConfig> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("macboot")?;
    let found = match xdg_dirs.find_config_file("config.toml") {
        Some(path) => load_from(&path)?,
        None => None,
    };
    Ok(found.unwrap_or_default())
}

/// Parse the config at `path`; `None` when the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<MacbootConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: MacbootConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(Some(cfg))
}
