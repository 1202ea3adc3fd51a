// External command execution
//
// Every device operation ends up here:
// - Commands: command representation and builders for the jukebox tools
// - SystemExecutor: runs a command as a child process and captures its output

pub mod commands;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

pub use commands::*;

use crate::error::{Result, RipitError};

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Exited(i32),
    /// Terminated by a signal without an exit code
    Signaled,
    /// Dry run: nothing was executed
    NotRun,
}

impl CommandStatus {
    pub fn code(&self) -> Option<i32> {
        match self {
            CommandStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }

    /// Exit code 0, or a dry run standing in for one
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Exited(0) | CommandStatus::NotRun)
    }
}

/// Exit status and captured streams of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn not_run() -> Self {
        Self {
            status: CommandStatus::NotRun,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exited<S1: Into<String>, S2: Into<String>>(code: i32, stdout: S1, stderr: S2) -> Self {
        Self {
            status: CommandStatus::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands on behalf of the device operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, command: &DeviceCommand) -> Result<CommandOutput>;
}

/// Executor backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    dry_run: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, command: &DeviceCommand) -> Result<CommandOutput> {
        info!(target: "ripit::audit", dry_run = self.dry_run, "{}", command);
        debug!("Description: {}", command.description);

        if self.dry_run {
            println!("{}", command);
            return Ok(CommandOutput::not_run());
        }

        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| RipitError::Spawn {
                program: command.program.clone(),
                source: e,
            })?;

        let status = match output.status.code() {
            Some(code) => CommandStatus::Exited(code),
            None => CommandStatus::Signaled,
        };
        let result = CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        info!(target: "ripit::audit", status = ?result.status, "{} finished", command.program);
        debug!(target: "ripit::audit", "stdout: {}", result.stdout.trim_end());
        debug!(target: "ripit::audit", "stderr: {}", result.stderr.trim_end());

        Ok(result)
    }
}
