// SPDX-License-Identifier: GPL-3.0-only

use std::process::ExitStatus;

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to execute {command}: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Required tool not found: {0}")]
    ToolMissing(String),
}

impl SysError {
    /// True when the command ran and exited non-zero
    pub fn is_command_failure(&self) -> bool {
        matches!(self, SysError::CommandFailed { .. })
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
