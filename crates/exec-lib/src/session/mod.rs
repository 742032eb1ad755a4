//! Terminal session initialization
//!
//! One `/exec/init` request runs the whole pipeline: resolve the workspace
//! pod and container, write the user's kubeconfig into the container, and
//! detect the shell to start. Every remote step depends on the previous
//! one, so the stages run strictly in sequence and the first failure
//! aborts the request.

mod container;
mod pod;

pub use container::resolve_container;
pub use pod::{find_workspace_pod, HostnameTieBreak, PodTieBreak};

use crate::cluster::ClientProvider;
use crate::config::ExecConfig;
use crate::error::{ErrorKind, SessionError};
use crate::health::{components, HealthRegistry};
use crate::kubeconfig::KubeconfigProvisioner;
use crate::models::{InitResponse, SessionInitRequest};
use crate::observability::StructuredLogger;
use crate::shell::ShellDetector;
use std::sync::Arc;
use tracing::{debug, error};

/// Runs the session initialization pipeline
#[derive(Clone)]
pub struct SessionInitializer {
    config: Arc<ExecConfig>,
    provider: Arc<dyn ClientProvider>,
    tie_break: Arc<dyn PodTieBreak>,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl SessionInitializer {
    /// Build an initializer disambiguating pods by the configured host identity
    pub fn new(config: Arc<ExecConfig>, provider: Arc<dyn ClientProvider>) -> Self {
        let tie_break = Arc::new(HostnameTieBreak::new(config.host_identity.clone()));
        let logger = StructuredLogger::new(config.workload.name.clone());
        Self {
            config,
            provider,
            tie_break,
            logger,
            health: None,
        }
    }

    pub fn with_tie_break(mut self, tie_break: Arc<dyn PodTieBreak>) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Report pipeline failures to `health` under `session_init`
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn init(&self, request: SessionInitRequest) -> Result<InitResponse, SessionError> {
        let result = self.run(&request).await;

        if let Some(health) = &self.health {
            match &result {
                Ok(_) => health.set_healthy(components::SESSION_INIT).await,
                Err(e) if matches!(e.kind(), ErrorKind::Internal | ErrorKind::RemoteExecution) => {
                    health
                        .set_degraded(components::SESSION_INIT, e.to_string())
                        .await
                }
                Err(_) => {}
            }
        }
        result
    }

    async fn run(&self, request: &SessionInitRequest) -> Result<InitResponse, SessionError> {
        let namespace = &self.config.workload.namespace;

        let client = self
            .provider
            .client_for_token(&request.token)
            .map_err(SessionError::Client)?;

        let pod = find_workspace_pod(
            client.as_ref(),
            namespace,
            &self.config.pod_selector,
            self.tie_break.as_ref(),
        )
        .await
        .map_err(|e| {
            error!(namespace = %namespace, error = %e, "Failed to find workspace pod");
            e
        })?;

        let container = resolve_container(request.container_name.as_deref(), &pod)?;
        debug!(pod = %pod.name, container = %container.name, "Resolved session target");

        let executor = client.executor(namespace);

        KubeconfigProvisioner::new(executor.clone(), self.config.api_server.clone())
            .provision(
                &pod.name,
                &container.name,
                &request.token,
                request.namespace.as_deref(),
                &request.username,
            )
            .await?;

        let shell = ShellDetector::new(executor)
            .detect(&pod.name, &container.name)
            .await?;

        self.logger
            .log_session_initialized(&pod.name, &container.name, &shell);

        Ok(InitResponse {
            pod_name: pod.name.clone(),
            container_name: container.name.clone(),
            cmd: vec![shell],
        })
    }
}
