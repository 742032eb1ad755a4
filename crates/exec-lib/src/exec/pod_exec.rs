//! Kubernetes exec implementation of [`RemoteExecutor`]

use super::{ExecOutput, RemoteExecError, RemoteExecutor};
use crate::observability::ExecMetrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Shell that interprets each command via `-c`
const EXEC_SHELL: &str = "/bin/sh";

/// Executes commands through the pod `exec` subresource
pub struct KubeExecutor {
    pods: Api<Pod>,
    metrics: ExecMetrics,
}

impl KubeExecutor {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            metrics: ExecMetrics::new(),
        }
    }

    async fn run(
        &self,
        pod: &str,
        container: &str,
        command: &str,
    ) -> Result<ExecOutput, RemoteExecError> {
        // The v4 channel protocol cannot half-close stdin: closing it tears
        // down the whole stream. The command goes in argv instead.
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .pods
            .exec(pod, [EXEC_SHELL, "-c", command], &params)
            .await
            .map_err(|e| {
                RemoteExecError::new(
                    format!("error setting up executor for command: {}", e),
                    ExecOutput::default(),
                )
            })?;

        let status = attached.take_status();
        let stdout = attached.stdout();
        let stderr = attached.stderr();

        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let output = ExecOutput::new(stdout, stderr);

        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        if let Err(e) = attached.join().await {
            return Err(RemoteExecError::new(e.to_string(), output));
        }

        match status {
            Some(status) if status.status.as_deref() == Some("Success") => Ok(output),
            Some(status) => {
                let reason = status
                    .message
                    .or(status.reason)
                    .unwrap_or_else(|| "command terminated unsuccessfully".to_string());
                Err(RemoteExecError::new(reason, output))
            }
            None => Err(RemoteExecError::new(
                "exec stream closed without reporting a command status",
                output,
            )),
        }
    }
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        command: &str,
    ) -> Result<ExecOutput, RemoteExecError> {
        let start = Instant::now();
        let result = self.run(pod, container, command).await;
        self.metrics
            .observe_remote_command_latency(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            self.metrics.inc_remote_command_failures();
            debug!(
                pod = %pod,
                container = %container,
                error = %e,
                stdout = %e.output.stdout,
                stderr = %e.output.stderr,
                "Remote command failed"
            );
        }
        result
    }
}

/// Read a stream to its end, keeping whatever arrived before an I/O error
async fn read_stream<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = stream {
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            debug!(error = %e, "Remote stream closed with error");
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
