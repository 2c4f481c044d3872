use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::metrics::ReloadMetrics;
use crate::routing::{ReloadError, RoutingConfig};

use super::readiness::TaskReporter;

/// A forced run; the sender is answered once the run completed
pub type ForceSignal = oneshot::Sender<()>;

/// Background task that reloads the routing config on an interval or on demand
pub struct ConfigReloadTask {
    routing: Arc<RoutingConfig>,
    interval: Duration,
    force: mpsc::Receiver<ForceSignal>,
    shutdown: broadcast::Receiver<()>,
    reporter: TaskReporter,
}

impl ConfigReloadTask {
    pub fn new(
        routing: Arc<RoutingConfig>,
        interval: Duration,
        force: mpsc::Receiver<ForceSignal>,
        shutdown: broadcast::Receiver<()>,
        reporter: TaskReporter,
    ) -> Self {
        Self {
            routing,
            interval,
            force,
            shutdown,
            reporter,
        }
    }

    pub async fn run(self) {
        let Self {
            routing,
            interval,
            mut force,
            mut shutdown,
            reporter,
        } = self;

        let mut timer = tokio::time::interval(interval);
        // Skip immediate first tick
        timer.tick().await;

        let _running = reporter.started();
        tracing::info!(
            interval_secs = interval.as_secs(),
            path = %routing.source().display(),
            "Config reloader started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Config reloader received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let _ = reload_logging_errors(&routing).await;
                }
                signal = force.recv() => {
                    let Some(done) = signal else {
                        break;
                    };
                    let _ = reload_logging_errors(&routing).await;
                    let _ = done.send(());
                }
            }
        }

        tracing::info!("Config reloader stopped");
    }
}

/// Reload the routing config; a failure keeps the previous snapshot and is logged.
pub async fn reload_logging_errors(routing: &RoutingConfig) -> Result<(), ReloadError> {
    tracing::info!("Reloading routing config");

    match routing.reload().await {
        Ok(()) => {
            ReloadMetrics::record_success(routing.snapshot().await.channel_count());
            Ok(())
        }
        Err(e) => {
            ReloadMetrics::record_failure();
            tracing::error!(
                path = %routing.source().display(),
                error = %e,
                "Failed to reload routing config"
            );
            Err(e)
        }
    }
}
