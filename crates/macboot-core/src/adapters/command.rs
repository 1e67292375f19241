//! Subprocess execution shared by the adapters.

use std::process::{Command, Stdio};

use super::AdapterError;
use crate::environment::Environment;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `program args...` with `env`, capturing output. Non-zero exit is an error.
pub fn run_command(
    program: &str,
    args: &[&str],
    env: &Environment,
) -> Result<CommandOutput, AdapterError> {
    tracing::debug!(program, ?args, "running command");
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    env.apply(&mut cmd);

    let output = cmd.output().map_err(|source| AdapterError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let out = CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    if !output.status.success() {
        return Err(AdapterError::Exit {
            program: program.to_string(),
            code: output.status.code(),
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out)
}
