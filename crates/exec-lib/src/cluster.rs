//! Control-plane access
//!
//! The service only needs four operations from the cluster: list the
//! workload's running pods, stop the workload, identify the caller, and
//! exec into a container. They are grouped behind [`ClusterClient`] and
//! handed out by a [`ClientProvider`], either scoped to a user's bearer
//! token or running as the pod's service account.

use crate::error::ClusterError;
use crate::exec::{KubeExecutor, RemoteExecutor};
use crate::models::{ContainerInfo, PodInfo, WorkloadIdentity};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

/// Annotation recording why the workload was stopped
pub const STOPPED_BY_ANNOTATION: &str = "controller.devfile.io/stopped-by";

/// Value of [`STOPPED_BY_ANNOTATION`] for idle suspension
pub const STOPPED_BY_INACTIVITY: &str = "inactivity";

/// Field selector restricting pod listings to running pods
const RUNNING_PHASE_SELECTOR: &str = "status.phase=Running";

/// Operations the service performs against the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List running pods in `namespace` matching `label_selector`
    async fn list_running_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>, ClusterError>;

    /// Patch the workload to `started: false`, annotated as stopped by inactivity
    async fn stop_workload(&self, workload: &WorkloadIdentity) -> Result<(), ClusterError>;

    /// UID of the user this client authenticates as
    async fn current_user_uid(&self) -> Result<String, ClusterError>;

    /// Remote executor for pods in `namespace`
    fn executor(&self, namespace: &str) -> Arc<dyn RemoteExecutor>;
}

/// Hands out cluster clients
pub trait ClientProvider: Send + Sync {
    /// Client authenticating with the given user token
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn ClusterClient>, ClusterError>;

    /// Client authenticating as this pod's service account
    fn service_client(&self) -> Result<Arc<dyn ClusterClient>, ClusterError>;
}

/// The body of the merge patch that suspends a workload
pub fn stop_workload_patch() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                STOPPED_BY_ANNOTATION: STOPPED_BY_INACTIVITY,
            }
        },
        "spec": {
            "started": false,
        }
    })
}

fn devworkspace_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("workspace.devfile.io", "v1alpha2", "DevWorkspace");
    ApiResource::from_gvk_with_plural(&gvk, "devworkspaces")
}

fn user_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("user.openshift.io", "v1", "User");
    ApiResource::from_gvk_with_plural(&gvk, "users")
}

/// Snapshot the parts of a pod the session pipeline cares about
pub fn pod_info(pod: &Pod) -> PodInfo {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|c| ContainerInfo::named(c.name.clone()))
                .collect()
        })
        .unwrap_or_default();

    PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        containers,
    }
}

/// [`ClusterClient`] backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_running_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default()
            .labels(label_selector)
            .fields(RUNNING_PHASE_SELECTOR);

        let list = pods.list(&params).await?;
        debug!(
            namespace = %namespace,
            selector = %label_selector,
            count = list.items.len(),
            "Listed workspace pods"
        );
        Ok(list.items.iter().map(pod_info).collect())
    }

    async fn stop_workload(&self, workload: &WorkloadIdentity) -> Result<(), ClusterError> {
        let resource = devworkspace_resource();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &workload.namespace, &resource);

        let patch = stop_workload_patch();
        api.patch(&workload.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn current_user_uid(&self) -> Result<String, ClusterError> {
        let resource = user_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);

        let user = api.get("~").await?;
        Ok(user.metadata.uid.unwrap_or_default())
    }

    fn executor(&self, namespace: &str) -> Arc<dyn RemoteExecutor> {
        Arc::new(KubeExecutor::new(self.client.clone(), namespace))
    }
}

/// Provider building clients from the in-cluster configuration
#[derive(Debug, Clone, Default)]
pub struct KubeClientProvider;

impl KubeClientProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ClientProvider for KubeClientProvider {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        if token.is_empty() {
            return Err(ClusterError::EmptyToken);
        }

        let mut config = Config::incluster()?;
        config.auth_info.token = Some(SecretString::new(token.to_string()));
        config.auth_info.token_file = None;

        let client = Client::try_from(config)?;
        Ok(Arc::new(KubeCluster::new(client)))
    }

    fn service_client(&self) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let config = Config::incluster()?;
        let client = Client::try_from(config)?;
        Ok(Arc::new(KubeCluster::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_stop_patch_shape() {
        let patch = stop_workload_patch();
        assert_eq!(patch["spec"]["started"], false);
        assert_eq!(
            patch["metadata"]["annotations"][STOPPED_BY_ANNOTATION],
            STOPPED_BY_INACTIVITY
        );
    }

    #[test]
    fn test_pod_info_keeps_container_order() {
        let container = |name: &str| Container {
            name: name.to_string(),
            ..Default::default()
        };
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("ws-pod".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    container("web-terminal-exec"),
                    container("web-terminal-tooling"),
                ],
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = pod_info(&pod);
        assert_eq!(info.name, "ws-pod");
        assert_eq!(info.containers.len(), 2);
        assert!(info.containers[0].is_infrastructure());
        assert_eq!(info.containers[1].name, "web-terminal-tooling");
    }

    #[test]
    fn test_empty_token_rejected() {
        let provider = KubeClientProvider::new();
        assert!(matches!(
            provider.client_for_token(""),
            Err(ClusterError::EmptyToken)
        ));
    }
}
