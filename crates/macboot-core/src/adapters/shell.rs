//! Bootstrap shell commands run through `bash -c`.

use super::command::{run_command, CommandOutput};
use super::{AdapterError, ShellRunner};
use crate::environment::Environment;

/// Uses bash (not sh/dash) because installer one-liners rely on bash features.
#[derive(Debug, Clone)]
pub struct BashShell {
    pub program: String,
}

impl Default for BashShell {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
        }
    }
}

impl ShellRunner for BashShell {
    fn run(&self, command: &str, env: &Environment) -> Result<CommandOutput, AdapterError> {
        run_command(&self.program, &["-c", command], env)
    }
}
