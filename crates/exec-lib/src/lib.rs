//! Core library for the web terminal exec service
//!
//! This crate provides the core functionality for:
//! - Session initialization (pod lookup, container selection,
//!   in-container kubeconfig provisioning, login shell detection)
//! - Idle tracking and automatic workload suspension
//! - Control-plane access and remote command execution
//! - Health checks and observability

pub mod activity;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod health;
pub mod kubeconfig;
pub mod models;
pub mod observability;
pub mod session;
pub mod shell;

#[cfg(test)]
mod testing;

pub use activity::{ActivityError, ActivityManager, IdleController, IdleOutcome};
pub use auth::Authenticator;
pub use cluster::{ClientProvider, ClusterClient, KubeClientProvider};
pub use config::{ExecConfig, IdleSettings};
pub use error::{ErrorKind, SessionError};
pub use exec::{ExecOutput, RemoteExecError, RemoteExecutor};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExecMetrics, StructuredLogger};
pub use session::{HostnameTieBreak, PodTieBreak, SessionInitializer};
