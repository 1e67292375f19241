//! Homebrew package manager adapter.

use std::path::PathBuf;

use super::command::run_command;
use super::{AdapterError, PackageManager};
use crate::environment::Environment;

/// Shells out to `brew`. App presence is checked in `app_dirs`.
#[derive(Debug, Clone)]
pub struct Homebrew {
    pub brew: String,
    pub app_dirs: Vec<PathBuf>,
}

impl Homebrew {
    pub fn new(brew: impl Into<String>, app_dirs: Vec<PathBuf>) -> Self {
        Self {
            brew: brew.into(),
            app_dirs,
        }
    }
}

impl PackageManager for Homebrew {
    fn install_package(&self, name: &str, env: &Environment) -> Result<(), AdapterError> {
        run_command(&self.brew, &["install", name], env)?;
        Ok(())
    }

    fn install_cask(&self, name: &str, env: &Environment) -> Result<(), AdapterError> {
        run_command(&self.brew, &["install", "--cask", name], env)?;
        Ok(())
    }

    fn is_app_installed(&self, bundle_name: &str) -> bool {
        self.app_dirs.iter().any(|d| d.join(bundle_name).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_presence_checks_every_dir() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        std::fs::create_dir(b.path().join("Firefox.app")).unwrap();
        let brew = Homebrew::new("brew", vec![a.path().to_path_buf(), b.path().to_path_buf()]);
        assert!(brew.is_app_installed("Firefox.app"));
        assert!(!brew.is_app_installed("Slack.app"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_brew_reports_exit() {
        // `false` stands in for a brew that rejects every install.
        let brew = Homebrew::new("false", vec![]);
        let err = brew
            .install_package("wget", &Environment::from_process())
            .unwrap_err();
        assert!(matches!(err, AdapterError::Exit { .. }));
    }
}
