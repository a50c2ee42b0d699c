//! Recording command runner for testing
//!
//! Records every op it is asked to run and can be configured to fail or
//! return canned output for ops whose command line contains a substring.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CommandRunner, Op};
use crate::ProvisionError;

/// Recording runner for testing
///
/// # Example
/// ```
/// use fleet_provision::runner::mock::RecordingRunner;
///
/// let runner = RecordingRunner::new()
///     .with_failure("qm start", "start failed")
///     .with_output("pvesh get", "[]");
/// ```
pub struct RecordingRunner {
    ops: Mutex<Vec<Op>>,
    failures: Vec<(String, String)>,
    outputs: Vec<(String, String)>,
}

impl RecordingRunner {
    /// Create a runner where every op succeeds with empty output
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            failures: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Fail any op whose command line contains `needle`
    pub fn with_failure(mut self, needle: &str, stderr: &str) -> Self {
        self.failures.push((needle.to_string(), stderr.to_string()));
        self
    }

    /// Return `stdout` from `capture` for ops containing `needle`
    pub fn with_output(mut self, needle: &str, stdout: &str) -> Self {
        self.outputs.push((needle.to_string(), stdout.to_string()));
        self
    }

    /// All ops seen so far, in order
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Rendered command lines seen so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.ops().iter().map(ToString::to_string).collect()
    }

    /// Rendered command lines containing `needle`
    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    fn record(&self, op: &Op) -> Result<(), ProvisionError> {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op.clone());
        }

        match self.failures.iter().find(|(needle, _)| op.matches(needle)) {
            Some((_, stderr)) => Err(ProvisionError::command_failed(op, Some(1), stderr.clone())),
            None => Ok(()),
        }
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, op: &Op) -> Result<(), ProvisionError> {
        self.record(op)
    }

    async fn capture(&self, op: &Op) -> Result<String, ProvisionError> {
        self.record(op)?;
        Ok(self
            .outputs
            .iter()
            .find(|(needle, _)| op.matches(needle))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_runner_records_in_order() {
        let runner = RecordingRunner::new();
        runner.run(&Op::new("qm").args(["create", "9000"])).await.unwrap();
        runner.run(&Op::new("qm").args(["template", "9000"])).await.unwrap();

        assert_eq!(runner.commands(), vec!["qm create 9000", "qm template 9000"]);
    }

    #[tokio::test]
    async fn test_recording_runner_failure() {
        let runner = RecordingRunner::new().with_failure("qm start", "no such vm");

        runner.run(&Op::new("qm").args(["clone", "9000", "101"])).await.unwrap();
        let err = runner
            .run(&Op::new("qm").args(["start", "101"]))
            .await
            .unwrap_err();

        assert_eq!(err.captured_stderr(), Some("no such vm"));
        // Failed ops are still recorded
        assert_eq!(runner.ops().len(), 2);
    }

    #[test]
    fn test_recording_runner_canned_output() {
        let runner = RecordingRunner::new().with_output("pvesh", "[{\"vmid\":100}]");

        let out = tokio_test::block_on(runner.capture(&Op::new("pvesh").arg("get"))).unwrap();
        assert_eq!(out, "[{\"vmid\":100}]");

        let other = tokio_test::block_on(runner.capture(&Op::new("which").arg("qm"))).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let runner = RecordingRunner::new().with_failure("second", "bad");
        let ops = vec![
            Op::new("echo").arg("first"),
            Op::new("echo").arg("second"),
            Op::new("echo").arg("third"),
        ];

        let result = tokio_test::block_on(runner.run_all(&ops));
        assert!(result.is_err());
        assert_eq!(runner.commands(), vec!["echo first", "echo second"]);
    }
}
