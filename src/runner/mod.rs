//! External command execution
//!
//! Every step of the pipeline is an [`Op`]: a program, its arguments and
//! any extra environment. Ops are executed by a [`CommandRunner`], which
//! applies the same failure policy to all of them: a spawn error or a
//! non-zero exit aborts the run with the command's captured stderr.

pub mod mock;

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tracing::{debug, info};

use crate::ProvisionError;

/// A single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Op {
    /// Create an op for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether the rendered command line contains `needle`
    pub fn matches(&self, needle: &str) -> bool {
        self.to_string().contains(needle)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes ops with uniform failure handling
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run an op, discarding stdout
    async fn run(&self, op: &Op) -> Result<(), ProvisionError>;

    /// Run an op and return its stdout
    async fn capture(&self, op: &Op) -> Result<String, ProvisionError>;

    /// Whether ops are only logged; host files must be left untouched too
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Run a list of ops in order, stopping at the first failure
    async fn run_all(&self, ops: &[Op]) -> Result<(), ProvisionError> {
        for (i, op) in ops.iter().enumerate() {
            debug!("Running op {}/{}", i + 1, ops.len());
            self.run(op).await?;
        }
        Ok(())
    }
}

/// Runs ops as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log ops instead of executing them
    pub fn dry_run(dry_run: bool) -> Self {
        Self { dry_run }
    }

    async fn execute(&self, op: &Op, capture_stdout: bool) -> Result<Vec<u8>, ProvisionError> {
        let mut command = tokio::process::Command::new(&op.program);
        command
            .args(&op.args)
            .envs(op.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stderr(Stdio::piped());

        if capture_stdout {
            command.stdout(Stdio::piped());
        } else {
            command.stdout(Stdio::null());
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProvisionError::spawn(op, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::command_failed(
                op,
                output.status.code(),
                stderr,
            ));
        }

        if !output.stderr.is_empty() {
            debug!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn run(&self, op: &Op) -> Result<(), ProvisionError> {
        if self.dry_run {
            info!("[dry-run] {}", op);
            return Ok(());
        }

        debug!("Running: {}", op);
        self.execute(op, false).await?;
        Ok(())
    }

    async fn capture(&self, op: &Op) -> Result<String, ProvisionError> {
        if self.dry_run {
            info!("[dry-run] {}", op);
            return Ok(String::new());
        }

        debug!("Capturing: {}", op);
        let stdout = self.execute(op, true).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
