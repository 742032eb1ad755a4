//! Error types shared across the exec service

use crate::kubeconfig::KubeconfigError;
use crate::shell::ShellError;
use thiserror::Error;

/// Errors raised while talking to the control plane
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A token-scoped client was requested without a token
    #[error("failed to create client: token must not be empty")]
    EmptyToken,

    /// In-cluster configuration could not be loaded
    #[error("failed to load in-cluster configuration: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other client-side failure
    #[error("{0}")]
    Other(String),
}

/// Category of a session pipeline failure, used to pick the response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request or a named container that does not exist
    Validation,
    /// Missing or invalid credentials
    Authorization,
    /// The target pod or container cannot be determined
    Resolution,
    /// A command inside the container failed
    RemoteExecution,
    /// Anything else
    Internal,
}

/// Errors from the session initialization pipeline and authentication
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("failed to create API client: {0}")]
    Client(#[source] ClusterError),

    #[error("failed to list pods in namespace '{namespace}': {source}")]
    ListPods {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("no workspace pods found in namespace '{0}'")]
    NoPods(String),

    #[error("could not determine the current workspace pod among {0} candidates")]
    AmbiguousPod(usize),

    #[error("container '{container}' not found in pod '{pod}'")]
    ContainerNotFound { container: String, pod: String },

    #[error("no suitable container found in pod '{0}'")]
    NoSuitableContainer(String),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

impl SessionError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::ContainerNotFound { .. } => ErrorKind::Validation,
            Self::NoPods(_) | Self::AmbiguousPod(_) | Self::NoSuitableContainer(_) => {
                ErrorKind::Resolution
            }
            Self::Kubeconfig(KubeconfigError::Exec { .. }) | Self::Shell(_) => {
                ErrorKind::RemoteExecution
            }
            Self::Client(_) | Self::ListPods { .. } | Self::Kubeconfig(_) => ErrorKind::Internal,
        }
    }
}
