//! Server configuration
//!
//! Flags take precedence over their environment variables. The workspace
//! identity and in-cluster service address come from the environment only.

use clap::Parser;
use exec_lib::config::{api_server_url, DEFAULT_IDLE_TIMEOUT, DEFAULT_STOP_RETRY_PERIOD};
use exec_lib::{ExecConfig, IdleSettings, WorkloadIdentity};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default deadline for one `/exec/init` request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),

    #[error("authenticated user ID must be specified via '--authenticated-user-id'")]
    MissingUserId,

    #[error("invalid value '{value}' for '--{flag}': {reason}")]
    InvalidDuration {
        flag: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid value for '--stop-retry-period': must be greater than zero if idling is enabled")]
    InvalidRetryPeriod,

    #[error("failed to read environment: {0}")]
    Source(#[from] config::ConfigError),
}

/// Command line flags
#[derive(Debug, Clone, Parser)]
#[command(name = "terminal-exec", version, about = "Web terminal exec server")]
pub struct Args {
    /// Host:Port address to listen on
    #[arg(long = "url", env = "API_URL", default_value = ":4444")]
    pub url: String,

    /// UID of the user allowed to use this terminal
    #[arg(long, env = "AUTHENTICATED_USER_ID")]
    pub authenticated_user_id: Option<String>,

    /// Label selector for the workspace pod
    /// [default: controller.devfile.io/devworkspace_id=$DEVWORKSPACE_ID]
    #[arg(long, env = "POD_SELECTOR")]
    pub pod_selector: Option<String>,

    /// Inactivity period after which the workspace is stopped.
    /// Use -1 to disable. Examples: -1, 30s, 15m, 1h
    #[arg(long, env = "IDLE_TIMEOUT", default_value = "5m", allow_hyphen_values = true)]
    pub idle_timeout: String,

    /// Delay before retrying a failed workspace stop. Example: 30s
    #[arg(long, env = "STOP_RETRY_PERIOD", default_value = "10s", allow_hyphen_values = true)]
    pub stop_retry_period: String,

    /// Deadline for a single session initialization
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s")]
    pub request_timeout: String,

    /// Accepted for backwards compatibility; always treated as true
    #[arg(
        long,
        hide = true,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub use_bearer_token: bool,

    /// Accepted for backwards compatibility; always treated as true
    #[arg(
        long,
        hide = true,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub use_tls: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            url: ":4444".to_string(),
            authenticated_user_id: None,
            pod_selector: None,
            idle_timeout: humantime::format_duration(DEFAULT_IDLE_TIMEOUT).to_string(),
            stop_retry_period: humantime::format_duration(DEFAULT_STOP_RETRY_PERIOD).to_string(),
            request_timeout: humantime::format_duration(DEFAULT_REQUEST_TIMEOUT).to_string(),
            use_bearer_token: true,
            use_tls: true,
        }
    }
}

/// `DEVWORKSPACE_*` environment variables
#[derive(Debug, Default, Deserialize)]
struct WorkloadEnv {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Everything the server needs at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub exec: ExecConfig,
    pub listen_addr: String,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Load from command line flags and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_parts(Args::parse(), process_env())
    }

    pub fn from_parts(args: Args, env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let workload = read_workload(&env)?;

        let authenticated_user_id = args
            .authenticated_user_id
            .filter(|uid| !uid.is_empty())
            .ok_or(ConfigError::MissingUserId)?;

        if !args.use_bearer_token {
            warn!("Flag '--use-bearer-token' is kept for backwards compatibility and must be set to true. Ignoring configured value");
        }
        if !args.use_tls {
            warn!("Flag '--use-tls' is kept for backwards compatibility and must be set to true. Ignoring configured value");
        }

        let pod_selector = args
            .pod_selector
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ExecConfig::default_pod_selector(&workload.id));

        let idle_timeout = parse_optional_duration("idle-timeout", &args.idle_timeout)?;
        let stop_retry_period = parse_optional_duration("stop-retry-period", &args.stop_retry_period)?;
        let request_timeout = parse_optional_duration("request-timeout", &args.request_timeout)?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let idle = match idle_timeout {
            Some(idle_timeout) => match stop_retry_period {
                Some(period) if !period.is_zero() => IdleSettings {
                    idle_timeout: Some(idle_timeout),
                    stop_retry_period: period,
                },
                _ => return Err(ConfigError::InvalidRetryPeriod),
            },
            None => IdleSettings::disabled(),
        };

        let lookup = |key: &str| env.get(key).map(String::as_str);
        let api_server = api_server_url(
            lookup("KUBERNETES_SERVICE_HOST"),
            lookup("KUBERNETES_SERVICE_PORT"),
        );
        let host_identity = lookup("HOSTNAME")
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        Ok(Self {
            exec: ExecConfig {
                workload,
                authenticated_user_id,
                pod_selector,
                api_server,
                host_identity,
                idle,
            },
            listen_addr: listen_addr(&args.url),
            request_timeout,
        })
    }

    /// Log the effective configuration
    pub fn print(&self) {
        let exec = &self.exec;
        let idle_timeout = exec
            .idle
            .idle_timeout
            .map(|d| humantime::format_duration(d).to_string())
            .unwrap_or_else(|| "disabled".to_string());

        info!("Web Terminal Exec configuration:");
        info!("==> Application url {}", self.listen_addr);
        info!("==> Workspace {}/{}", exec.workload.namespace, exec.workload.name);
        info!("==> Authenticated user ID: {}", exec.authenticated_user_id);
        info!("==> Pod selector: {}", exec.pod_selector);
        info!("==> Idle timeout: {}", idle_timeout);
        info!(
            "==> Stop retry period: {}",
            humantime::format_duration(exec.idle.stop_retry_period)
        );
        info!(
            "==> Request timeout: {}",
            humantime::format_duration(self.request_timeout)
        );
    }
}

/// Process environment, skipping entries that are not valid UTF-8
fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn read_workload(env: &HashMap<String, String>) -> Result<WorkloadIdentity, ConfigError> {
    let source = config::Config::builder()
        .add_source(config::Environment::with_prefix("DEVWORKSPACE").source(Some(env.clone())))
        .build()?;
    let raw: WorkloadEnv = source.try_deserialize()?;

    let require = |value: Option<String>, var: &'static str| {
        value
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv(var))
    };

    Ok(WorkloadIdentity {
        name: require(raw.name, "DEVWORKSPACE_NAME")?,
        namespace: require(raw.namespace, "DEVWORKSPACE_NAMESPACE")?,
        id: require(raw.id, "DEVWORKSPACE_ID")?,
    })
}

/// Parse a human readable duration; a negative value means "off"
fn parse_optional_duration(
    flag: &'static str,
    value: &str,
) -> Result<Option<Duration>, ConfigError> {
    let value = value.trim();
    let invalid = |reason: String| ConfigError::InvalidDuration {
        flag,
        value: value.to_string(),
        reason,
    };

    if let Some(magnitude) = value.strip_prefix('-') {
        // Bare integers such as `-1` carry no unit
        if magnitude.parse::<u64>().is_ok() {
            return Ok(None);
        }
        return humantime::parse_duration(magnitude)
            .map(|_| None)
            .map_err(|e| invalid(e.to_string()));
    }
    if value == "0" {
        return Ok(Some(Duration::ZERO));
    }
    humantime::parse_duration(value)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}

/// `:port` binds every interface
fn listen_addr(url: &str) -> String {
    if url.starts_with(':') {
        format!("0.0.0.0{}", url)
    } else {
        url.to_string()
    }
}
