//! Web Terminal Exec
//!
//! Runs next to a terminal workspace: prepares terminal sessions inside
//! the workspace pod and stops the workspace once the user goes idle.

use anyhow::{Context, Result};
use exec_lib::health::{components, HealthRegistry};
use exec_lib::{
    Authenticator, ClientProvider, ExecMetrics, IdleController, KubeClientProvider,
    SessionInitializer, StructuredLogger,
};
use std::sync::Arc;
use terminal_exec::api::{self, AppState};
use terminal_exec::config::ServerConfig;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXEC_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins over LOG_LEVEL; both fall back to info
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load().context("invalid configuration")?;
    config.print();

    let exec_config = Arc::new(config.exec.clone());
    let logger = StructuredLogger::new(exec_config.workload.name.clone());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SESSION_INIT).await;
    let metrics = ExecMetrics::new();

    let provider: Arc<dyn ClientProvider> = Arc::new(KubeClientProvider::new());

    let controller = IdleController::new(
        &exec_config.idle,
        exec_config.workload.clone(),
        provider.as_ref(),
    )
    .context("failed to set up idle tracking")?
    .with_health(health_registry.clone());
    let activity = controller.handle();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let controller_task = controller.start(shutdown_rx);

    let controller_health = health_registry.clone();
    tokio::spawn(async move {
        match controller_task.await {
            Ok(outcome) => info!(outcome = ?outcome, "Idle controller finished"),
            Err(e) => {
                error!(error = %e, "Idle controller task failed");
                controller_health
                    .set_unhealthy(components::IDLE_CONTROLLER, e.to_string())
                    .await;
            }
        }
    });

    let state = Arc::new(AppState {
        initializer: SessionInitializer::new(exec_config.clone(), provider.clone())
            .with_health(health_registry.clone()),
        authenticator: Authenticator::new(
            provider.clone(),
            exec_config.authenticated_user_id.clone(),
        ),
        activity,
        health_registry: health_registry.clone(),
        metrics,
        request_timeout: config.request_timeout,
    });
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    logger.log_startup(EXEC_VERSION, &config.listen_addr);
    health_registry.set_ready(true).await;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            logger.log_shutdown(reason);
            if shutdown_tx.send(()).is_err() {
                info!("Idle controller already finished");
            }
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Wait for SIGTERM or Ctrl-C and name the one that arrived
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
