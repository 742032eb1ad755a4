//! Container selection within the workspace pod

use crate::error::SessionError;
use crate::models::{ContainerInfo, PodInfo, TOOLING_CONTAINER_NAME};

/// Pick the container a terminal session should attach to.
///
/// An explicitly requested name must match exactly. Otherwise the exec
/// infrastructure container is skipped; a single remaining container is
/// used as is, the tooling container wins among several, and the first
/// one in pod order is the fallback.
pub fn resolve_container<'a>(
    requested: Option<&str>,
    pod: &'a PodInfo,
) -> Result<&'a ContainerInfo, SessionError> {
    if let Some(name) = requested {
        return pod
            .containers
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SessionError::ContainerNotFound {
                container: name.to_string(),
                pod: pod.name.clone(),
            });
    }

    let candidates: Vec<&ContainerInfo> = pod
        .containers
        .iter()
        .filter(|c| !c.is_infrastructure())
        .collect();

    match candidates.as_slice() {
        [] => Err(SessionError::NoSuitableContainer(pod.name.clone())),
        [only] => Ok(*only),
        [first, ..] => Ok(candidates
            .iter()
            .copied()
            .find(|c| c.name == TOOLING_CONTAINER_NAME)
            .unwrap_or(*first)),
    }
}
