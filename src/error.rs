//! Error types for fleet-provision

use thiserror::Error;

use crate::runner::Op;

/// Main error type for provisioning operations
///
/// Every variant is fatal: the pipeline stops at the first error and the
/// working directory is released on the way out.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with status {}", exit_status(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl ProvisionError {
    /// Create a spawn error for an operation
    pub fn spawn(op: &Op, source: std::io::Error) -> Self {
        Self::Spawn {
            command: op.to_string(),
            source,
        }
    }

    /// Create a command failure for an operation
    pub fn command_failed(op: &Op, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: op.to_string(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Create a stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Standard error captured from a failed external command, if any
    pub fn captured_stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } if !stderr.trim().is_empty() => Some(stderr),
            _ => None,
        }
    }
}
