//! Core data models for the exec service

use serde::{Deserialize, Serialize};

/// Name of the container that hosts this service inside the workspace pod.
/// It only exists to serve remote exec and is never picked implicitly.
pub const EXEC_CONTAINER_NAME: &str = "web-terminal-exec";

/// Container preferred for interactive sessions when several are present
pub const TOOLING_CONTAINER_NAME: &str = "web-terminal-tooling";

/// Username written to the kubeconfig when the client does not supply one
pub const DEFAULT_USERNAME: &str = "Developer";

/// Identity of the managed workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub name: String,
    pub id: String,
}

/// Role of a container within the workload pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    /// Regular container a terminal may attach to
    Workload,
    /// Exec plumbing; excluded from implicit selection
    Infrastructure,
}

/// Container as seen in a pod snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub role: ContainerRole,
}

impl ContainerInfo {
    /// Build a container entry, classifying its role by name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let role = if name == EXEC_CONTAINER_NAME {
            ContainerRole::Infrastructure
        } else {
            ContainerRole::Workload
        };
        Self { name, role }
    }

    pub fn is_infrastructure(&self) -> bool {
        self.role == ContainerRole::Infrastructure
    }
}

/// Read-only snapshot of a running workload pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    /// Containers in the order reported by the platform
    pub containers: Vec<ContainerInfo>,
}

/// Body of an `/exec/init` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    /// Optional; the first suitable container is used when absent
    #[serde(default, rename = "container")]
    pub container_name: Option<String>,
    #[serde(default, rename = "kubeconfig")]
    pub kubeconfig_params: KubeconfigParams,
}

/// Kubeconfig customization supplied by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeconfigParams {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A fully authenticated session initialization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInitRequest {
    pub container_name: Option<String>,
    pub namespace: Option<String>,
    pub username: String,
    pub token: String,
}

impl SessionInitRequest {
    /// Combine request parameters with the verified bearer token.
    /// Empty strings are treated as absent.
    pub fn new(params: InitParams, token: impl Into<String>) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            container_name: non_empty(params.container_name),
            namespace: non_empty(params.kubeconfig_params.namespace),
            username: non_empty(params.kubeconfig_params.username)
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            token: token.into(),
        }
    }
}

/// Successful `/exec/init` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(rename = "pod")]
    pub pod_name: String,
    #[serde(rename = "container")]
    pub container_name: String,
    pub cmd: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_role_from_name() {
        assert!(ContainerInfo::named(EXEC_CONTAINER_NAME).is_infrastructure());
        assert!(!ContainerInfo::named(TOOLING_CONTAINER_NAME).is_infrastructure());
    }

    #[test]
    fn test_init_params_from_empty_json() {
        let params: InitParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, InitParams::default());
    }

    #[test]
    fn test_session_request_defaults() {
        let params: InitParams = serde_json::from_str(
            r#"{"container": "", "kubeconfig": {"namespace": "dev", "username": ""}}"#,
        )
        .unwrap();
        let request = SessionInitRequest::new(params, "token");

        assert_eq!(request.container_name, None);
        assert_eq!(request.namespace.as_deref(), Some("dev"));
        assert_eq!(request.username, DEFAULT_USERNAME);
        assert_eq!(request.token, "token");
    }

    #[test]
    fn test_init_response_wire_format() {
        let response = InitResponse {
            pod_name: "ws-pod".to_string(),
            container_name: "tools".to_string(),
            cmd: vec!["/bin/bash".to_string()],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"pod": "ws-pod", "container": "tools", "cmd": ["/bin/bash"]})
        );
    }
}
