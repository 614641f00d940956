//! Post-build diagnostics
//!
//! Runs `pytest` and `flake8` inside a run directory and captures exit codes
//! plus the tail of their output. Diagnostics only ever degrade the test
//! stage: a missing tool, a timeout, or a non-zero exit is recorded, never
//! raised.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Output kept per stream, from the end
const OUTPUT_TAIL_BYTES: usize = 4000;

/// Exit code recorded when a command could not run to completion
pub const NOT_RUN: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandReport {
    pub command: String,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    pub fn passed(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsReport {
    pub pytest: CommandReport,
    pub flake8: CommandReport,
}

impl DiagnosticsReport {
    pub fn passed(&self) -> bool {
        self.pytest.passed() && self.flake8.passed()
    }
}

/// Run pytest and flake8 in `run_dir`, each bounded by `timeout`
pub async fn run_diagnostics(run_dir: &Path, timeout: Duration) -> DiagnosticsReport {
    let pytest = run_command(
        "pytest",
        &["-q", "--maxfail=1", "--disable-warnings"],
        run_dir,
        timeout,
    )
    .await;
    let flake8 = run_command("flake8", &[], run_dir, timeout).await;

    tracing::info!(
        pytest = pytest.code,
        flake8 = flake8.code,
        "Diagnostics finished"
    );

    DiagnosticsReport { pytest, flake8 }
}

pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> CommandReport {
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(command = %command, error = %e, "Diagnostic command unavailable");
            return CommandReport {
                command,
                code: NOT_RUN,
                stdout: String::new(),
                stderr: format!("failed to start: {}", e),
            };
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandReport {
            command,
            code: output.status.code().unwrap_or(NOT_RUN),
            stdout: tail(&output.stdout),
            stderr: tail(&output.stderr),
        },
        Ok(Err(e)) => CommandReport {
            command,
            code: NOT_RUN,
            stdout: String::new(),
            stderr: e.to_string(),
        },
        Err(_) => CommandReport {
            command,
            code: NOT_RUN,
            stdout: String::new(),
            stderr: "timeout".to_string(),
        },
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= OUTPUT_TAIL_BYTES {
        return text.into_owned();
    }
    let mut start = text.len() - OUTPUT_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
