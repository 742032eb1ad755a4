//! Kubeconfig generation and provisioning inside the target container
//!
//! The generated document lets tooling inside the terminal (`kubectl`,
//! `oc`) reach the API server with the user's own token.

use crate::exec::{RemoteExecError, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// CA bundle mounted into every pod by the service account admission
pub const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Writes the kubeconfig embedded as a heredoc to `$KUBECONFIG`,
/// falling back to `$HOME/.kube/config`
const WRITE_KUBECONFIG_SCRIPT: &str = r#"
set -e
if [ -z "$KUBECONFIG" ]; then
	KUBECONFIG_DIR="$HOME/.kube"
	KUBECONFIG_FILE="config"
else
	KUBECONFIG_DIR="$(dirname "$KUBECONFIG")"
	KUBECONFIG_FILE="$(basename "$KUBECONFIG")"
fi
mkdir -p "$KUBECONFIG_DIR"
cat <<'EOF' > "$KUBECONFIG_DIR/$KUBECONFIG_FILE"
{kubeconfig}EOF
"#;

/// Kubeconfig provisioning errors
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("could not find $KUBERNETES_SERVICE_HOST or $KUBERNETES_SERVICE_PORT")]
    MissingApiServer,

    #[error("failed to serialize kubeconfig: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("failed to create kubeconfig in container '{container}' of pod '{pod}'")]
    Exec {
        pod: String,
        container: String,
        #[source]
        source: RemoteExecError,
    },
}

/// Client configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub server: String,
    #[serde(rename = "certificate-authority")]
    pub certificate_authority: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub user: String,
}

impl KubeConfig {
    /// Build a single-cluster, single-user kubeconfig
    pub fn generate(token: &str, server: &str, namespace: Option<&str>, username: &str) -> Self {
        let context_name = format!("{}-context", username);
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: server.to_string(),
                cluster: ClusterInfo {
                    server: server.to_string(),
                    certificate_authority: SERVICE_ACCOUNT_CA_PATH.to_string(),
                },
            }],
            users: vec![NamedUser {
                name: username.to_string(),
                user: UserInfo {
                    token: token.to_string(),
                },
            }],
            contexts: vec![NamedContext {
                name: context_name.clone(),
                context: ContextInfo {
                    cluster: server.to_string(),
                    namespace: namespace.unwrap_or_default().to_string(),
                    user: username.to_string(),
                },
            }],
            current_context: context_name,
        }
    }

    pub fn to_yaml(&self) -> Result<String, KubeconfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Shell script writing `kubeconfig` into the container
pub fn write_kubeconfig_script(kubeconfig: &str) -> String {
    let mut body = kubeconfig.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    WRITE_KUBECONFIG_SCRIPT.replace("{kubeconfig}", &body)
}

/// Materializes a user kubeconfig inside a container
pub struct KubeconfigProvisioner {
    executor: Arc<dyn RemoteExecutor>,
    api_server: Option<String>,
}

impl KubeconfigProvisioner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, api_server: Option<String>) -> Self {
        Self {
            executor,
            api_server,
        }
    }

    /// Generate the kubeconfig for the user and write it into `container`
    pub async fn provision(
        &self,
        pod: &str,
        container: &str,
        token: &str,
        namespace: Option<&str>,
        username: &str,
    ) -> Result<(), KubeconfigError> {
        let server = self
            .api_server
            .as_deref()
            .ok_or(KubeconfigError::MissingApiServer)?;

        let kubeconfig = KubeConfig::generate(token, server, namespace, username).to_yaml()?;
        let script = write_kubeconfig_script(&kubeconfig);

        self.executor
            .exec(pod, container, &script)
            .await
            .map_err(|source| KubeconfigError::Exec {
                pod: pod.to_string(),
                container: container.to_string(),
                source,
            })?;

        debug!(pod = %pod, container = %container, "Created kubeconfig in container");
        Ok(())
    }
}
