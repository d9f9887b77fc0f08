// SPDX-License-Identifier: GPL-3.0-only

//! External command execution
//!
//! Every external effect of the provisioner (LVM, mkfs, mount, ...) goes
//! through [`CommandRunner`], so the workflow can be exercised against a
//! scripted fake in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SysError};

/// A program invocation: program, arguments and optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    /// Append a path argument
    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Run in `cwd` instead of the runner's working directory
    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command, discarding its output. Non-zero exit is an error.
    async fn run(&self, command: &CommandLine) -> Result<()>;

    /// Run a command and return its stdout. Non-zero exit is an error.
    async fn output(&self, command: &CommandLine) -> Result<String>;

    /// Like [`run`](Self::run), but a non-zero exit yields `Ok(false)`.
    ///
    /// Failing to start the program is still an error.
    async fn try_run(&self, command: &CommandLine) -> Result<bool> {
        match self.run(command).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_command_failure() => {
                debug!("{} exited non-zero: {}", command, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`output`](Self::output), but a non-zero exit yields `Ok(None)`.
    async fn try_output(&self, command: &CommandLine) -> Result<Option<String>> {
        match self.output(command).await {
            Ok(stdout) => Ok(Some(stdout)),
            Err(e) if e.is_command_failure() => {
                debug!("{} exited non-zero: {}", command, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs commands on the host via `tokio::process`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    /// Working directory for commands that don't set their own
    cwd: PathBuf,
    /// Discard child stdout in `run`
    quiet: bool,
    /// Pass child stderr through instead of capturing it
    show_stderr: bool,
}

impl SystemRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            quiet: true,
            show_stderr: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn show_stderr(mut self, show_stderr: bool) -> Self {
        self.show_stderr = show_stderr;
        self
    }

    fn command(&self, command: &CommandLine) -> Command {
        let cwd = command.cwd.as_deref().unwrap_or(&self.cwd);
        debug!("Running: {} cwd: {}", command, cwd.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stderr(if self.show_stderr {
                Stdio::inherit()
            } else {
                Stdio::piped()
            });
        cmd
    }

    async fn execute(&self, command: &CommandLine, mut cmd: Command) -> Result<String> {
        let output = cmd.output().await.map_err(|source| SysError::CommandSpawn {
            command: command.render(),
            source,
        })?;

        if !output.status.success() {
            return Err(SysError::CommandFailed {
                command: command.render(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<()> {
        let mut cmd = self.command(command);
        cmd.stdout(if self.quiet {
            Stdio::null()
        } else {
            Stdio::inherit()
        });
        self.execute(command, cmd).await.map(|_| ())
    }

    async fn output(&self, command: &CommandLine) -> Result<String> {
        let mut cmd = self.command(command);
        cmd.stdout(Stdio::piped());
        self.execute(command, cmd).await
    }
}
