//! Narrow contracts with the collaborators macboot drives but does not implement:
//! the package manager, the preference store, the disk-image mounter, the
//! config templater, and a shell for bootstrap commands.
//!
//! Production implementations shell out to `brew`, `defaults`, `hdiutil` and
//! `bash`; tests substitute in-memory fakes.

mod brew;
mod command;
mod defaults;
mod hdiutil;
mod shell;
mod template;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::Environment;

pub use brew::Homebrew;
pub use command::{run_command, CommandOutput};
pub use defaults::Defaults;
pub use hdiutil::{parse_attach_output, Hdiutil};
pub use shell::BashShell;
pub use template::{write_config_file, PlaceholderTemplater};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected output from {program}: {detail}")]
    Parse { program: String, detail: String },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template: {0}")]
    Template(String),
}

/// Package manager: formula and cask installs plus app presence checks.
pub trait PackageManager: Send + Sync {
    fn install_package(&self, name: &str, env: &Environment) -> Result<(), AdapterError>;
    fn install_cask(&self, name: &str, env: &Environment) -> Result<(), AdapterError>;
    /// True when an application bundle (e.g. `Firefox.app`) is already installed.
    fn is_app_installed(&self, bundle_name: &str) -> bool;
}

/// A typed preference value as written to the preference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PreferenceValue {
    /// The `defaults write` type flag and value text.
    pub fn to_defaults_args(&self) -> (&'static str, String) {
        match self {
            PreferenceValue::Bool(b) => ("-bool", b.to_string()),
            PreferenceValue::Int(i) => ("-int", i.to_string()),
            PreferenceValue::Float(f) => ("-float", f.to_string()),
            PreferenceValue::String(s) => ("-string", s.clone()),
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn set_preference(
        &self,
        domain: &str,
        key: &str,
        value: &PreferenceValue,
        env: &Environment,
    ) -> Result<(), AdapterError>;
}

/// Where a disk image got mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    /// Device node when the mounter reports one (e.g. `/dev/disk4s1`).
    pub device: Option<String>,
}

pub trait DiskImageMounter: Send + Sync {
    /// Mount read-only without showing the volume in Finder.
    fn mount(&self, image: &Path) -> Result<MountPoint, AdapterError>;
    fn unmount(&self, mount: &MountPoint) -> Result<(), AdapterError>;
}

/// Renders a fixed template with a small set of substitution values.
pub trait Templater: Send + Sync {
    fn render(
        &self,
        template: &str,
        values: &std::collections::BTreeMap<String, String>,
    ) -> Result<String, AdapterError>;
}

/// Runs bootstrap shell commands (e.g. the package manager's own installer).
pub trait ShellRunner: Send + Sync {
    fn run(&self, command: &str, env: &Environment) -> Result<CommandOutput, AdapterError>;
}
