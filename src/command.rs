//! External command execution behind an injectable runner.

use std::ffi::OsString;
use std::fmt;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::backend::BackendFuture;

/// A program invocation: argv plus extra environment for the child.
#[derive(Clone, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Environment variables added to the child process. Values may be
    /// secret and are never rendered.
    pub envs: Vec<(String, String)>,
}

impl CommandInvocation {
    /// Creates an invocation with no arguments or extra environment.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OsString>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Adds an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns a shell-like command string for logs and assertions. The
    /// environment is omitted.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the value of an environment variable set for the child.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys = self
            .envs
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        f.debug_struct("CommandInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .finish()
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Errors raised while running external commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command completes with a non-zero or missing exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    Failure {
        /// Command that failed.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

impl CommandError {
    /// Converts an unsuccessful output into a [`CommandError::Failure`].
    #[must_use]
    pub fn failure(program: &str, output: CommandOutput) -> Self {
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Self::Failure {
            program: program.to_owned(),
            status: output.code,
            status_text,
            stderr: output.stderr.trim().to_owned(),
        }
    }
}

/// Future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> = BackendFuture<'a, CommandOutput, CommandError>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, invocation: &'a CommandInvocation) -> CommandFuture<'a>;
}

/// Real command runner that spawns processes on the host.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, invocation: &'a CommandInvocation) -> CommandFuture<'a> {
        Box::pin(async move {
            let output = Command::new(&invocation.program)
                .args(&invocation.args)
                .envs(
                    invocation
                        .envs
                        .iter()
                        .map(|(key, value)| (key.as_str(), value.as_str())),
                )
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|err| CommandError::Spawn {
                    program: invocation.program.clone(),
                    message: err.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn process_runner_captures_streams_and_exit_code() {
        let invocation = CommandInvocation::new("sh")
            .arg("-c")
            .arg("printf \"$GREETING\"; printf err >&2; exit 3")
            .env("GREETING", "hello");

        let output = ProcessCommandRunner
            .run(&invocation)
            .await
            .expect("sh should spawn");

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "err");
        assert!(!output.is_success());
    }

    #[rstest]
    #[tokio::test]
    async fn process_runner_reports_spawn_failures() {
        let invocation = CommandInvocation::new("/nonexistent/minfs-volume-test-binary");
        let err = ProcessCommandRunner
            .run(&invocation)
            .await
            .expect_err("missing binary should not spawn");
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[rstest]
    fn debug_output_omits_environment_values() {
        let invocation = CommandInvocation::new("minfs").env("MINFS_SECRET_KEY", "hunter2");
        let rendered = format!("{invocation:?}");
        assert!(rendered.contains("MINFS_SECRET_KEY"));
        assert!(!rendered.contains("hunter2"));
    }

    #[rstest]
    fn failure_without_exit_code_reports_unknown_status() {
        let err = CommandError::failure(
            "umount",
            CommandOutput {
                code: None,
                stdout: String::new(),
                stderr: String::from("killed\n"),
            },
        );
        assert_eq!(err.to_string(), "umount exited with status unknown: killed");
    }
}
