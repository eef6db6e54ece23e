//! External command runner
//!
//! Launches a script, waits for it and captures everything it printed. The runner has no
//! error channel: a command that cannot even be started still yields a fully populated
//! [`ProcessResult`] with `returncode = 1` and a diagnostic on stderr.

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Return code reported when the command could not be launched at all
pub const LAUNCH_FAILURE_CODE: i32 = 1;

/// Captured outcome of one external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub stdout: String,
    pub stdout_lines: Vec<String>,
    pub stderr: String,
    pub stderr_lines: Vec<String>,
    pub returncode: i32,
}

impl ProcessResult {
    /// Build a result from the raw text a finished process produced
    pub fn from_output(stdout: String, stderr: String, returncode: i32) -> Self {
        Self {
            stdout_lines: split_lines(&stdout),
            stdout,
            stderr_lines: split_lines(&stderr),
            stderr,
            returncode,
        }
    }

    /// Build the result reported when the command never ran
    ///
    /// stderr carries the error description followed by the stack trace captured here.
    pub fn launch_failure(error: &dyn std::fmt::Display) -> Self {
        let description = error.to_string();
        let trace = Backtrace::force_capture().to_string();

        let mut stderr_lines = vec![description.clone()];
        stderr_lines.extend(split_lines(&trace));

        Self {
            stdout: String::new(),
            stdout_lines: Vec::new(),
            stderr: format!("{}\n{}", description, trace),
            stderr_lines,
            returncode: LAUNCH_FAILURE_CODE,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}

/// Split captured output into lines; empty text gives no lines
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Run `command` (program followed by its arguments) inside `working_dir`
///
/// Waits for completion without a timeout. Never fails.
pub async fn run_and_capture(command: &[String], working_dir: &Path) -> ProcessResult {
    let Some((program, args)) = command.split_first() else {
        let err = io::Error::new(io::ErrorKind::InvalidInput, "cannot run an empty command");
        warn!("Refusing to launch: {}", err);
        return ProcessResult::launch_failure(&err);
    };

    let command_line = command.join(" ");
    info!(
        command = %command_line,
        working_dir = %working_dir.display(),
        "Launching external command"
    );
    let started = Instant::now();

    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) => {
            let returncode = exit_code(output.status);
            let result = ProcessResult::from_output(
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                returncode,
            );

            let elapsed = started.elapsed();
            if result.succeeded() {
                info!(command = %command_line, ?elapsed, "External command finished");
            } else {
                warn!(
                    command = %command_line,
                    returncode,
                    ?elapsed,
                    "External command exited with failure"
                );
            }
            debug!(
                stdout_lines = result.stdout_lines.len(),
                stderr_lines = result.stderr_lines.len(),
                "Captured command output"
            );

            result
        }
        Err(e) => {
            warn!(command = %command_line, "Failed to launch external command: {}", e);
            ProcessResult::launch_failure(&e)
        }
    }
}

/// Exit code, or the negated signal number for a signal-terminated process
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
