// src/main.rs
use anyhow::Result;
use composite_health::{
    config::{self, Config, LoggingConfig},
    health::HealthRegistry,
    metrics::{start_metrics_server, MetricsRegistry},
    server::{HealthHandler, ServerBuilder},
    telemetry::{Telemetry, SERVICE_NAME},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn, Dispatch, Instrument};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = match config::load_config(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            let telemetry = Telemetry::init(&LoggingConfig::default())?;
            telemetry.in_scope(|| error!(path = %config_path, "Failed to load configuration: {:#}", e));
            if let Err(flush) = telemetry.shutdown() {
                eprintln!("Failed to flush logs: {}", flush);
            }
            return Err(e);
        }
    };

    let telemetry = Telemetry::init(&config.logging)?;
    let dispatch = telemetry.dispatch();
    let span = telemetry.in_scope(|| tracing::info_span!("service", service_name = SERVICE_NAME));

    let result = run(config, dispatch.clone())
        .instrument(span)
        .with_subscriber(dispatch)
        .await;

    if let Err(e) = &result {
        telemetry.in_scope(|| error!("Application terminated unexpectedly: {:#}", e));
    }
    if let Err(flush) = telemetry.shutdown() {
        eprintln!("Failed to flush logs: {}", flush);
    }

    result
}

async fn run(config: Config, dispatch: Dispatch) -> Result<()> {
    info!("Starting web application");

    let shutdown = CancellationToken::new();

    let metrics = if config.metrics.enabled {
        let registry = Arc::new(MetricsRegistry::new()?);
        let collector = registry.collector();
        let metrics_addr = SocketAddr::new(config.server.listen.ip(), config.metrics.port);
        start_metrics_server(
            metrics_addr,
            registry,
            config.metrics.path.clone(),
            shutdown.clone(),
            dispatch.clone(),
        )
        .await?;
        Some(collector)
    } else {
        None
    };

    let registry = Arc::new(HealthRegistry::from_config(&config, metrics)?);
    if registry.is_empty() {
        warn!("No services configured; every report will be Healthy");
    } else {
        info!(services = ?registry.service_names(), "Registered health checks");
    }

    let trigger = shutdown.clone();
    tokio::spawn(
        async move {
            shutdown_signal().await;
            trigger.cancel();
        }
        .in_current_span()
        .with_subscriber(dispatch.clone()),
    );

    let handler = HealthHandler::new(registry).with_shutdown(shutdown.clone());

    ServerBuilder::new(config.server.listen)
        .with_handler(handler)
        .with_shutdown(shutdown)
        .with_dispatch(dispatch)
        .serve()
        .await?;

    info!("Shutdown complete");
    Ok(())
}

// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
