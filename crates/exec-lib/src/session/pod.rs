//! Workspace pod lookup

use crate::cluster::ClusterClient;
use crate::error::SessionError;
use crate::models::PodInfo;
use tracing::debug;

/// Chooses one pod when the selector matches several running pods
pub trait PodTieBreak: Send + Sync {
    fn choose(&self, pods: Vec<PodInfo>) -> Option<PodInfo>;
}

/// Prefers the pod whose name matches this process's host name.
///
/// This covers deployments where every terminal gets a dedicated pod and
/// the exec server runs inside it. Without a host name the first pod wins.
#[derive(Debug, Clone, Default)]
pub struct HostnameTieBreak {
    hostname: Option<String>,
}

impl HostnameTieBreak {
    pub fn new(hostname: Option<String>) -> Self {
        Self {
            hostname: hostname.filter(|h| !h.is_empty()),
        }
    }
}

impl PodTieBreak for HostnameTieBreak {
    fn choose(&self, pods: Vec<PodInfo>) -> Option<PodInfo> {
        match &self.hostname {
            Some(hostname) => pods.into_iter().find(|p| &p.name == hostname),
            None => pods.into_iter().next(),
        }
    }
}

/// Find the running workspace pod matching `selector`
pub async fn find_workspace_pod(
    client: &dyn ClusterClient,
    namespace: &str,
    selector: &str,
    tie_break: &dyn PodTieBreak,
) -> Result<PodInfo, SessionError> {
    let mut pods = client
        .list_running_pods(namespace, selector)
        .await
        .map_err(|source| SessionError::ListPods {
            namespace: namespace.to_string(),
            source,
        })?;

    match pods.len() {
        0 => Err(SessionError::NoPods(namespace.to_string())),
        1 => Ok(pods.remove(0)),
        count => {
            debug!(count, "Multiple workspace pods found, applying tie-break");
            tie_break
                .choose(pods)
                .ok_or(SessionError::AmbiguousPod(count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerInfo;

    fn pod(name: &str) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            containers: vec![ContainerInfo::named("tools")],
        }
    }

    #[test]
    fn test_hostname_match_wins() {
        let tie_break = HostnameTieBreak::new(Some("terminal-pod".to_string()));
        let chosen = tie_break
            .choose(vec![pod("other-pod"), pod("terminal-pod")])
            .unwrap();
        assert_eq!(chosen.name, "terminal-pod");
    }

    #[test]
    fn test_no_hostname_match() {
        let tie_break = HostnameTieBreak::new(Some("terminal-pod".to_string()));
        assert!(tie_break
            .choose(vec![pod("other-pod"), pod("another-pod")])
            .is_none());
    }

    #[test]
    fn test_missing_hostname_takes_first() {
        let tie_break = HostnameTieBreak::new(Some(String::new()));
        let chosen = tie_break
            .choose(vec![pod("first-pod"), pod("second-pod")])
            .unwrap();
        assert_eq!(chosen.name, "first-pod");
    }
}
