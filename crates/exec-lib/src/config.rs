//! Runtime configuration shared by the session pipeline and idle controller
//!
//! Built once at startup and passed around behind an `Arc`; nothing in
//! this crate reads process environment after that point.

use crate::models::WorkloadIdentity;
use std::net::IpAddr;
use std::time::Duration;

/// Default idle timeout before the workload is suspended
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default delay between failed suspend attempts
pub const DEFAULT_STOP_RETRY_PERIOD: Duration = Duration::from_secs(10);

/// Idle tracking settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    /// Inactivity period after which the workload is stopped.
    /// `None` disables idle tracking entirely.
    pub idle_timeout: Option<Duration>,
    /// Period between suspend retries after a failed attempt
    pub stop_retry_period: Duration,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            stop_retry_period: DEFAULT_STOP_RETRY_PERIOD,
        }
    }
}

impl IdleSettings {
    pub fn disabled() -> Self {
        Self {
            idle_timeout: None,
            stop_retry_period: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.idle_timeout.is_some()
    }
}

/// Immutable service configuration
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Workload whose pod hosts terminals and whose lifecycle is managed
    pub workload: WorkloadIdentity,
    /// UID of the only user allowed to use this terminal (may be empty)
    pub authenticated_user_id: String,
    /// Label selector matching the workload pod
    pub pod_selector: String,
    /// API server URL written into generated kubeconfigs
    pub api_server: Option<String>,
    /// Host name of this process, used to disambiguate between pods
    pub host_identity: Option<String>,
    pub idle: IdleSettings,
}

impl ExecConfig {
    /// Selector used when none is configured explicitly
    pub fn default_pod_selector(workload_id: &str) -> String {
        format!("controller.devfile.io/devworkspace_id={}", workload_id)
    }
}

/// Build the API server URL from the in-cluster service host and port.
/// Returns `None` if either part is missing or empty.
pub fn api_server_url(host: Option<&str>, port: Option<&str>) -> Option<String> {
    let host = host.filter(|h| !h.is_empty())?;
    let port = port.filter(|p| !p.is_empty())?;

    let host = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]", host),
        _ => host.to_string(),
    };
    Some(format!("https://{}:{}", host, port))
}
