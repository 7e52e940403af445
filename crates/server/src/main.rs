//! tfmirrord - caching Terraform provider network mirror.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::Env;
use std::sync::Arc;
use std::time::Duration;
use tfmirror_core::Config;
use tfmirror_server::metrics::metrics_router;
use tfmirror_server::{AppState, RegistryClient, create_router};
use tfmirror_storage::{MetricsStorage, Storage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Window in-flight requests get to finish after a shutdown signal.
const DRAIN_WINDOW: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from the environment
    let config: Config = Figment::new()
        .merge(Env::raw().map(|name| name.as_str().to_ascii_lowercase().into()))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    // Initialize tracing. RUST_LOG takes precedence over LOG_LEVEL when set.
    let (level, level_fallback) = parse_log_level(&config.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("{level},tower_http=info"))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if level_fallback {
        tracing::warn!(
            log_level = %config.log_level,
            "unknown LOG_LEVEL, falling back to info"
        );
    }

    tracing::info!("tfmirror v{}", env!("CARGO_PKG_VERSION"));

    // Register Prometheus metrics
    tfmirror_storage::metrics::register_metrics();

    // Initialize the store and wrap it with the metrics decorator
    let storage = tfmirror_storage::from_config(&config)
        .await
        .context("failed to initialize storage")?;
    let storage: Arc<dyn Storage> = Arc::new(MetricsStorage::new(storage));
    tracing::info!(backend = storage.backend_name(), "storage backend initialized");

    let upstream = Arc::new(RegistryClient::new().context("failed to build upstream client")?);
    let state = AppState::new(config.clone(), storage, upstream);

    let app = create_router(state);
    let metrics_app = metrics_router();

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind to {}", config.listen_addr()))?;
    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_addr())
        .await
        .with_context(|| format!("failed to bind to {}", config.metrics_addr()))?;

    tracing::info!("server is running on {}", config.listen_addr());
    tracing::info!("metrics server is running on {}", config.metrics_addr());

    // Both listeners drain on the same shutdown broadcast.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let mut main_rx = shutdown_tx.subscribe();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = main_rx.recv().await;
            })
            .await
    });

    let mut metrics_rx = shutdown_tx.subscribe();
    let mut metrics_server = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = metrics_rx.recv().await;
            })
            .await
    });

    // Run until a signal arrives or a listener fails.
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutting down gracefully");
        }
        result = &mut server => {
            result.context("server task panicked")?.context("server error")?;
            anyhow::bail!("server exited unexpectedly");
        }
        result = &mut metrics_server => {
            result.context("metrics server task panicked")?.context("metrics server error")?;
            anyhow::bail!("metrics server exited unexpectedly");
        }
    }

    let _ = shutdown_tx.send(());

    let drain = async {
        let _ = server.await;
        let _ = metrics_server.await;
    };
    if tokio::time::timeout(DRAIN_WINDOW, drain).await.is_err() {
        tracing::warn!("drain window elapsed, closing remaining connections");
    }

    tracing::info!("server exiting");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Map `LOG_LEVEL` onto a tracing level. Unknown values fall back to `info`;
/// the boolean reports whether the fallback was taken.
fn parse_log_level(level: &str) -> (&'static str, bool) {
    match level.to_lowercase().as_str() {
        "trace" => ("trace", false),
        "debug" => ("debug", false),
        "info" => ("info", false),
        "warn" | "warning" => ("warn", false),
        // tracing has no fatal/panic levels; error is the closest.
        "error" | "fatal" | "panic" => ("error", false),
        _ => ("info", true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_mapping() {
        assert_eq!(parse_log_level("debug"), ("debug", false));
        assert_eq!(parse_log_level("INFO"), ("info", false));
        assert_eq!(parse_log_level("warn"), ("warn", false));
        assert_eq!(parse_log_level("fatal"), ("error", false));
        assert_eq!(parse_log_level("panic"), ("error", false));
        assert_eq!(parse_log_level("verbose"), ("info", true));
        assert_eq!(parse_log_level(""), ("info", true));
    }
}
