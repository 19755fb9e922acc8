//! One-shot commands with captured output.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;
use tracing::warn;

use crate::error::ProcessError;

/// Exit code and decoded output of a finished command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was killed by a signal.
    pub rc: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.rc == Some(0)
    }
}

/// Runs `program` with `args` and waits for it.
///
/// With `env`, the child sees exactly those variables; otherwise it inherits
/// the daemon's environment. A non-zero exit is logged, not an error.
pub async fn cmd<I, S>(
    program: &str,
    args: I,
    env: Option<&HashMap<String, String>>,
) -> Result<CommandOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    run(command, program, env, "command").await
}

/// Runs `script` through `/bin/sh -c` and waits for it.
pub async fn shell(
    script: &str,
    env: Option<&HashMap<String, String>>,
) -> Result<CommandOutput, ProcessError> {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(script);
    run(command, script, env, "shell command").await
}

async fn run(
    mut command: Command,
    label: &str,
    env: Option<&HashMap<String, String>>,
    what: &'static str,
) -> Result<CommandOutput, ProcessError> {
    if label.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }
    if let Some(env) = env {
        command.env_clear().envs(env);
    }

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|error| ProcessError::Spawn {
            program: label.to_string(),
            error,
        })?;

    let out = CommandOutput {
        rc: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !out.success() {
        warn!(command = label, rc = ?out.rc, stderr = out.stderr.trim(), "{what} returned non-zero");
    }
    Ok(out)
}
