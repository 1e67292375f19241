//! Process environment handed to adapter subprocesses.
//!
//! Values are immutable: a phase that changes PATH (e.g. after installing the
//! package manager) produces a new `Environment` for the phases after it.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    path: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot of the current process PATH.
    pub fn from_process() -> Self {
        let path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self {
            path,
            vars: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &[PathBuf] {
        &self.path
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// New environment with `dirs` in front of PATH, in order. Entries already present move to the front.
    pub fn with_path_prepended<I, P>(&self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let front: Vec<PathBuf> = dirs.into_iter().map(|d| d.as_ref().to_path_buf()).collect();
        let mut path = front.clone();
        path.extend(self.path.iter().filter(|p| !front.contains(p)).cloned());
        Self {
            path,
            vars: self.vars.clone(),
        }
    }

    /// New environment with `name` set to `value`.
    pub fn with_var(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(name.into(), value.into());
        Self {
            path: self.path.clone(),
            vars,
        }
    }

    /// PATH joined for the platform. Empty when no entries are set.
    pub fn joined_path(&self) -> OsString {
        std::env::join_paths(&self.path).unwrap_or_default()
    }

    /// Apply PATH and extra variables to a command about to be spawned.
    pub fn apply(&self, cmd: &mut Command) {
        if !self.path.is_empty() {
            cmd.env("PATH", self.joined_path());
        }
        for (k, v) in &self.vars {
            cmd.env(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_returns_new_value() {
        let base = Environment::default().with_path_prepended(["/usr/bin", "/bin"]);
        let next = base.with_path_prepended(["/opt/homebrew/bin"]);
        assert_eq!(base.path().len(), 2);
        assert_eq!(
            next.path(),
            &[
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin")
            ]
        );
    }

    #[test]
    fn prepend_moves_existing_entry_to_front() {
        let base = Environment::default().with_path_prepended(["/usr/bin", "/opt/homebrew/bin"]);
        let next = base.with_path_prepended(["/opt/homebrew/bin"]);
        assert_eq!(
            next.path(),
            &[PathBuf::from("/opt/homebrew/bin"), PathBuf::from("/usr/bin")]
        );
    }

    #[test]
    fn vars_are_copied_not_shared() {
        let base = Environment::default().with_var("HOMEBREW_NO_ANALYTICS", "1");
        let next = base.with_var("HOMEBREW_NO_AUTO_UPDATE", "1");
        assert_eq!(base.var("HOMEBREW_NO_AUTO_UPDATE"), None);
        assert_eq!(next.var("HOMEBREW_NO_ANALYTICS"), Some("1"));
        assert_eq!(next.var("HOMEBREW_NO_AUTO_UPDATE"), Some("1"));
    }
}
