use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use herald_notification_service::config::Settings;
use herald_notification_service::metrics::encode_metrics;
use herald_notification_service::notifier::{LogNotifier, NotifierRegistry};
use herald_notification_service::NotificationBackend;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Register notifiers
    let notifiers = Arc::new(NotifierRegistry::new());
    if settings.notifiers.log.enabled {
        notifiers.register(Arc::new(LogNotifier::new()));
    }

    let backend =
        NotificationBackend::initialize(&settings.backend.open_string, notifiers, &settings).await?;
    backend.start().await?;
    backend.block_until_ready().await;
    tracing::info!("Notification backend ready");

    shutdown_signal().await?;

    backend.shutdown().await;

    let stats = backend.stats();
    tracing::info!(
        batches = stats.batches,
        sends_ok = stats.sends_ok,
        sends_failed = stats.sends_failed,
        "Shutdown complete"
    );
    if let Ok(metrics) = encode_metrics() {
        tracing::debug!(metrics = %metrics, "Final metrics");
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    Ok(())
}
