//! Switchboard resilience service.
//!
//! Hosts the cache sweeper and the auto-retry scheduler for a chat inbox.
//! Loads configuration, initializes tracing and coordinates graceful
//! startup and shutdown of both background tasks.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use switchboard_cache::CacheService;
use switchboard_core::{Clock, MulticastEventHandler, RealClock, TracingEventHandler};
use switchboard_retry::{AutoRetryScheduler, GatewayTransport, RetryQueue};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log)?;

    info!(
        execution_mode = ?config.execution_mode,
        gateway_url = %config.gateway_url,
        auto_retry_enabled = config.auto_retry_enabled,
        "Starting switchboard resilience service"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let shutdown_token = CancellationToken::new();

    let cache = CacheService::with_cancellation(
        config.to_cache_config(),
        clock.clone(),
        shutdown_token.clone(),
    );
    if cache.start_sweeper().context("Failed to start cache sweeper")? {
        info!("Cache sweeper started");
    }

    let transport = Arc::new(
        GatewayTransport::new(config.to_client_config())
            .context("Failed to create gateway transport")?,
    );

    let mut event_handler = MulticastEventHandler::new();
    event_handler.add_subscriber(Arc::new(TracingEventHandler));
    let queue = Arc::new(
        RetryQueue::new(transport, config.to_retry_policy(), clock.clone())
            .with_event_handler(Arc::new(event_handler)),
    );

    let scheduler_config = config.to_scheduler_config();
    if config.auto_retry_enabled && !scheduler_config.enabled {
        info!("request-scoped execution, auto-retry scheduler not started");
    }
    let scheduler = scheduler_config.enabled.then(|| {
        AutoRetryScheduler::spawn(
            queue.clone(),
            &scheduler_config,
            clock.clone(),
            shutdown_token.child_token(),
        )
    });

    info!("Switchboard is ready");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    shutdown_token.cancel();
    let timeout = config.shutdown_timeout();

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown_graceful(timeout).await {
            error!(error = %e, "Auto-retry scheduler did not stop cleanly");
        }
    }

    if let Err(e) = cache.shutdown(timeout).await {
        error!(error = %e, "Cache sweeper did not stop cleanly");
    }

    let pending = queue.size();
    if pending > 0 {
        warn!(pending, "Retry queue is in-memory, queued messages are discarded");
    }

    info!("Switchboard shutdown complete");
    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` over the configured filter.
fn init_tracing(fallback_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
