//! Idle tracking and automatic workload suspension
//!
//! The controller owns a single deadline. Activity signals push it out by
//! the idle timeout; when it fires, the workload is stopped. A failed stop
//! re-arms the same deadline for the retry period, so at most one timer is
//! ever pending.
//!
//! Activity is delivered through a capacity-1 channel. A tick arriving
//! while another one is still pending is dropped: the pending tick resets
//! the deadline when it is consumed, which is all the extra one would do.

use crate::cluster::{ClientProvider, ClusterClient};
use crate::config::IdleSettings;
use crate::error::ClusterError;
use crate::health::{components, HealthRegistry};
use crate::models::WorkloadIdentity;
use crate::observability::{ExecMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Upper bound for one stop request against the API server
const STOP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle controller construction errors
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("stop retry period must be greater than zero when idling is enabled")]
    InvalidRetryPeriod,

    #[error("failed to create API client for idle tracking: {0}")]
    Client(#[from] ClusterError),
}

/// How the controller loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Idle tracking was turned off; the loop never ran
    Disabled,
    /// The workload was stopped after inactivity
    Stopped,
    /// A shutdown signal arrived first
    ShutDown,
}

/// Cloneable handle for reporting user activity
#[derive(Clone)]
pub struct ActivityManager {
    sender: Option<mpsc::Sender<()>>,
    metrics: ExecMetrics,
}

impl ActivityManager {
    /// Handle whose ticks go nowhere
    pub fn disabled() -> Self {
        Self {
            sender: None,
            metrics: ExecMetrics::new(),
        }
    }

    /// Register user activity without blocking.
    ///
    /// Returns whether the signal was queued. Dropped signals (one already
    /// pending, or the controller has exited) are not errors.
    pub fn tick(&self) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        self.metrics.inc_activity_ticks();

        match sender.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Activity tick already pending, dropping");
                self.metrics.inc_activity_ticks_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Idle controller has exited, ignoring activity tick");
                false
            }
        }
    }
}

struct Tracking {
    idle_timeout: Duration,
    stop_retry_period: Duration,
    client: Arc<dyn ClusterClient>,
    receiver: mpsc::Receiver<()>,
}

/// Stops the workload after a period without activity
pub struct IdleController {
    tracking: Option<Tracking>,
    sender: Option<mpsc::Sender<()>>,
    workload: WorkloadIdentity,
    metrics: ExecMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl IdleController {
    /// Create a controller for `workload`.
    ///
    /// With idling disabled the provider is never consulted and the
    /// controller does nothing.
    pub fn new(
        settings: &IdleSettings,
        workload: WorkloadIdentity,
        provider: &dyn ClientProvider,
    ) -> Result<Self, ActivityError> {
        let metrics = ExecMetrics::new();
        let logger = StructuredLogger::new(workload.name.clone());

        let Some(idle_timeout) = settings.idle_timeout else {
            return Ok(Self {
                tracking: None,
                sender: None,
                workload,
                metrics,
                logger,
                health: None,
            });
        };

        if settings.stop_retry_period.is_zero() {
            return Err(ActivityError::InvalidRetryPeriod);
        }

        let client = provider.service_client()?;
        let (sender, receiver) = mpsc::channel(1);

        Ok(Self {
            tracking: Some(Tracking {
                idle_timeout,
                stop_retry_period: settings.stop_retry_period,
                client,
                receiver,
            }),
            sender: Some(sender),
            workload,
            metrics,
            logger,
            health: None,
        })
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn handle(&self) -> ActivityManager {
        ActivityManager {
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Spawn the tracking loop
    pub fn start(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<IdleOutcome> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> IdleOutcome {
        let Some(mut tracking) = self.tracking.take() else {
            info!("Idle tracking disabled");
            return IdleOutcome::Disabled;
        };

        if let Some(health) = &self.health {
            health.register(components::IDLE_CONTROLLER).await;
        }
        info!(
            idle_timeout = ?tracking.idle_timeout,
            stop_retry_period = ?tracking.stop_retry_period,
            "Idle tracking started"
        );

        let deadline = sleep(tracking.idle_timeout);
        tokio::pin!(deadline);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping idle tracking");
                    return IdleOutcome::ShutDown;
                }

                Some(()) = tracking.receiver.recv() => {
                    debug!("Activity received, resetting idle deadline");
                    deadline.as_mut().reset(Instant::now() + tracking.idle_timeout);
                    attempts = 0;
                }

                () = &mut deadline => {
                    attempts += 1;
                    info!(attempt = attempts, "Idle timeout reached, stopping workspace");

                    match self.stop_workload(tracking.client.as_ref()).await {
                        Ok(()) => {
                            self.metrics.inc_workload_stop_attempts(true);
                            self.logger
                                .log_workload_stopped(&self.workload.namespace, attempts);
                            if let Some(health) = &self.health {
                                health.set_healthy(components::IDLE_CONTROLLER).await;
                            }
                            return IdleOutcome::Stopped;
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                attempt = attempts,
                                retry_in = ?tracking.stop_retry_period,
                                "Failed to stop workspace"
                            );
                            self.metrics.inc_workload_stop_attempts(false);
                            if let Some(health) = &self.health {
                                health
                                    .set_degraded(
                                        components::IDLE_CONTROLLER,
                                        format!("failed to stop workspace: {}", e),
                                    )
                                    .await;
                            }
                            deadline
                                .as_mut()
                                .reset(Instant::now() + tracking.stop_retry_period);
                        }
                    }
                }
            }
        }
    }

    async fn stop_workload(&self, client: &dyn ClusterClient) -> Result<(), ClusterError> {
        match timeout(STOP_ATTEMPT_TIMEOUT, client.stop_workload(&self.workload)).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::Other(format!(
                "stop request timed out after {:?}",
                STOP_ATTEMPT_TIMEOUT
            ))),
        }
    }
}
