//! Remote command execution inside workload containers
//!
//! Everything that needs to run something in a container goes through the
//! [`RemoteExecutor`] trait so tests can substitute a scripted executor.

mod pod_exec;

pub use pod_exec::KubeExecutor;

use async_trait::async_trait;
use thiserror::Error;

/// Output captured from a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// A remote command that failed to run or exited unsuccessfully.
/// Output collected before the failure is kept for diagnostics.
#[derive(Debug, Error)]
#[error("error executing command in container: {reason}")]
pub struct RemoteExecError {
    pub reason: String,
    pub output: ExecOutput,
}

impl RemoteExecError {
    pub fn new(reason: impl Into<String>, output: ExecOutput) -> Self {
        Self {
            reason: reason.into(),
            output,
        }
    }
}

/// Runs a single shell command in a container and collects its output
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Feed `command` to a shell in `container` of `pod` and wait for it to finish
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        command: &str,
    ) -> Result<ExecOutput, RemoteExecError>;
}
