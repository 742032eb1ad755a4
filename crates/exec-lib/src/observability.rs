//! Observability infrastructure for the exec service
//!
//! Provides:
//! - Prometheus metrics (init outcomes, remote command latency, activity ticks,
//!   workload stop attempts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for remote command latency (in seconds)
const REMOTE_COMMAND_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExecMetricsInner> = OnceLock::new();

struct ExecMetricsInner {
    init_requests: IntCounterVec,
    remote_command_seconds: Histogram,
    remote_command_failures: IntCounter,
    activity_ticks: IntCounter,
    activity_ticks_dropped: IntCounter,
    workload_stop_attempts: IntCounterVec,
}

impl ExecMetricsInner {
    fn new() -> Self {
        Self {
            init_requests: register_int_counter_vec!(
                "terminal_exec_init_requests_total",
                "Session initialization requests by outcome",
                &["outcome"]
            )
            .expect("Failed to register init_requests_total"),

            remote_command_seconds: register_histogram!(
                "terminal_exec_remote_command_seconds",
                "Time spent running a command inside a workspace container",
                REMOTE_COMMAND_BUCKETS.to_vec()
            )
            .expect("Failed to register remote_command_seconds"),

            remote_command_failures: register_int_counter!(
                "terminal_exec_remote_command_failures_total",
                "Remote commands that failed or could not be started"
            )
            .expect("Failed to register remote_command_failures_total"),

            activity_ticks: register_int_counter!(
                "terminal_exec_activity_ticks_total",
                "Activity signals received"
            )
            .expect("Failed to register activity_ticks_total"),

            activity_ticks_dropped: register_int_counter!(
                "terminal_exec_activity_ticks_dropped_total",
                "Activity signals dropped because one was already pending"
            )
            .expect("Failed to register activity_ticks_dropped_total"),

            workload_stop_attempts: register_int_counter_vec!(
                "terminal_exec_workload_stop_attempts_total",
                "Attempts to stop the workload after inactivity, by result",
                &["result"]
            )
            .expect("Failed to register workload_stop_attempts_total"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ExecMetrics {
    _private: (),
}

impl Default for ExecMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExecMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExecMetricsInner {
        GLOBAL_METRICS.get_or_init(ExecMetricsInner::new)
    }

    /// Count a finished `/exec/init` request; `outcome` is `success` or an error kind
    pub fn inc_init_requests(&self, outcome: &str) {
        self.inner()
            .init_requests
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn observe_remote_command_latency(&self, duration_secs: f64) {
        self.inner().remote_command_seconds.observe(duration_secs);
    }

    pub fn inc_remote_command_failures(&self) {
        self.inner().remote_command_failures.inc();
    }

    pub fn inc_activity_ticks(&self) {
        self.inner().activity_ticks.inc();
    }

    pub fn inc_activity_ticks_dropped(&self) {
        self.inner().activity_ticks_dropped.inc();
    }

    pub fn inc_workload_stop_attempts(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.inner()
            .workload_stop_attempts
            .with_label_values(&[result])
            .inc();
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    workspace: String,
}

impl StructuredLogger {
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "exec_started",
            workspace = %self.workspace,
            version = %version,
            listen_addr = %listen_addr,
            "Web terminal exec started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exec_shutdown",
            workspace = %self.workspace,
            reason = %reason,
            "Web terminal exec shutting down"
        );
    }

    pub fn log_session_initialized(&self, pod: &str, container: &str, shell: &str) {
        info!(
            event = "session_initialized",
            workspace = %self.workspace,
            pod = %pod,
            container = %container,
            shell = %shell,
            "Terminal session initialized"
        );
    }

    pub fn log_workload_stopped(&self, namespace: &str, attempts: u32) {
        if attempts > 1 {
            warn!(
                event = "workload_stopped",
                workspace = %self.workspace,
                namespace = %namespace,
                attempts = attempts,
                "Workspace stopped by inactivity after retries"
            );
        } else {
            info!(
                event = "workload_stopped",
                workspace = %self.workspace,
                namespace = %namespace,
                attempts = attempts,
                "Workspace stopped by inactivity"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let first = ExecMetrics::new();
        let second = first.clone();

        let before = first.inner().activity_ticks.get();
        second.inc_activity_ticks();
        assert!(first.inner().activity_ticks.get() > before);
    }

    #[test]
    fn test_stop_attempt_labels() {
        let metrics = ExecMetrics::new();
        metrics.inc_workload_stop_attempts(false);
        metrics.inc_workload_stop_attempts(true);

        let inner = metrics.inner();
        assert!(inner.workload_stop_attempts.with_label_values(&["failure"]).get() >= 1);
        assert!(inner.workload_stop_attempts.with_label_values(&["success"]).get() >= 1);
    }
}
