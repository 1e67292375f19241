//! macOS preference store adapter (`defaults write`).

use super::command::run_command;
use super::{AdapterError, PreferenceStore, PreferenceValue};
use crate::environment::Environment;

#[derive(Debug, Clone)]
pub struct Defaults {
    pub program: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            program: "defaults".to_string(),
        }
    }
}

/// Argument list for `defaults write domain key -type value`.
pub(super) fn write_args<'a>(
    domain: &'a str,
    key: &'a str,
    type_flag: &'a str,
    value: &'a str,
) -> [&'a str; 5] {
    ["write", domain, key, type_flag, value]
}

impl PreferenceStore for Defaults {
    fn set_preference(
        &self,
        domain: &str,
        key: &str,
        value: &PreferenceValue,
        env: &Environment,
    ) -> Result<(), AdapterError> {
        let (flag, text) = value.to_defaults_args();
        run_command(&self.program, &write_args(domain, key, flag, &text), env)?;
        Ok(())
    }
}
