//! Timeout-bounded execution of the external CLI
//!
//! Spawns the external tool with an explicit argument vector (no shell),
//! stdin closed and both output streams captured, then waits for it under
//! a deadline. A process that outlives the deadline is force-killed; a
//! binary that cannot be started at all is reported distinctly from a
//! non-zero exit so callers can tell "not installed" apart from "ran and
//! failed".
//!
//! The spawned process inherits the ambient environment plus the
//! credential variable the tool requires. No concurrency limit is imposed
//! here; callers serialize per session as they see fit.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors distinct from a process that ran to completion.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The binary could not be located or started.
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived the deadline and was killed.
    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Captured stdout, lossily decoded and trimmed
    pub stdout: String,

    /// Captured stderr, lossily decoded and trimmed
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executor for the external CLI process.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    /// Name of the credential variable injected into the child environment
    api_key_env: String,
}

impl CliExecutor {
    pub fn new(api_key_env: impl Into<String>) -> Self {
        Self {
            api_key_env: api_key_env.into(),
        }
    }

    /// Name of the credential variable this executor injects.
    pub fn api_key_env(&self) -> &str {
        &self.api_key_env
    }

    /// Run `argv` in `cwd` under `deadline`.
    ///
    /// A non-zero exit is not an error at this layer: the caller decides
    /// what it means from the exit code and captured streams.
    pub async fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        deadline: Duration,
    ) -> Result<ExecOutput, ExecError> {
        let (program, args) = argv.split_first().ok_or_else(|| ExecError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argument vector"),
        })?;

        debug!(command = %program, cwd = %cwd.display(), "spawning external tool");

        // Inherit the ambient environment and make sure the credential
        // variable is present even if empty, matching how the tool is
        // invoked interactively.
        let api_key = std::env::var(&self.api_key_env).unwrap_or_default();

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env(&self.api_key_env, api_key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(waited) => waited.map_err(|source| ExecError::Spawn {
                command: program.clone(),
                source,
            })?,
            Err(_elapsed) => {
                // Dropping the future killed the child via kill_on_drop
                warn!(command = %program, "external tool timed out, killed");
                return Err(ExecError::Timeout {
                    seconds: deadline.as_secs(),
                });
            }
        };

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let output = executor
            .run(
                &argv(&["echo", "hello world"]),
                Path::new("."),
                Duration::from_secs(5),
            )
            .await
            .expect("echo runs");

        assert!(output.success());
        assert_eq!(output.stdout, "hello world");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let output = executor
            .run(&argv(&["false"]), Path::new("."), Duration::from_secs(5))
            .await
            .expect("false runs");

        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_failure() {
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let result = executor
            .run(
                &argv(&["relay-no-such-binary-7f3a"]),
                Path::new("."),
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let started = std::time::Instant::now();
        let result = executor
            .run(
                &argv(&["sleep", "30"]),
                Path::new("."),
                Duration::from_millis(300),
            )
            .await;

        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        // Must return promptly after the deadline, not after 30s
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_argv_is_a_spawn_failure() {
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let result = executor
            .run(&[], Path::new("."), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_runs_in_given_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = CliExecutor::new("RELAY_TEST_KEY");
        let output = executor
            .run(&argv(&["pwd"]), dir.path(), Duration::from_secs(5))
            .await
            .expect("pwd runs");

        let canonical = dir.path().canonicalize().expect("canonicalize");
        assert_eq!(Path::new(&output.stdout), canonical.as_path());
    }
}
