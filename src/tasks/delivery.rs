use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use crate::dispatch::{DispatchMode, Dispatcher};
use crate::routing::RoutingConfig;

use super::config_reload::ForceSignal;
use super::readiness::TaskReporter;

/// One pass over the routing config, dispatching every due channel's backlog
pub struct ScheduledDelivery {
    routing: Arc<RoutingConfig>,
    dispatcher: Arc<Dispatcher>,
    never_send: bool,
}

impl ScheduledDelivery {
    pub fn new(routing: Arc<RoutingConfig>, dispatcher: Arc<Dispatcher>, never_send: bool) -> Self {
        Self {
            routing,
            dispatcher,
            never_send,
        }
    }

    /// Spawn a dispatch for every channel whose window contains `now` and that
    /// has undelivered notifications no other dispatch is sending. Returns how
    /// many dispatches were spawned.
    ///
    /// Dispatches run on their own tasks; a slow notifier on one channel does
    /// not hold up the others or the next pass.
    pub async fn deliver_due(&self, now: DateTime<Utc>) -> usize {
        if self.never_send {
            tracing::debug!("Sending disabled, skipping scheduled delivery");
            return 0;
        }

        let snapshot = self.routing.snapshot().await;
        let mut spawned = 0;

        for channel in snapshot.channels() {
            if !channel.should_send_now(now) {
                continue;
            }

            // Resolve under the routing lock; the channel may have been removed
            // by a reload since the snapshot was taken.
            let Some(resolved) = self.routing.resolve(channel.name()).await else {
                continue;
            };

            // Notifications still held by a running dispatch are left to it
            let pending = match self.dispatcher.claim_undelivered(channel.name()).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!(
                        channel = %channel.name(),
                        error = %e,
                        "Failed to load undelivered notifications"
                    );
                    continue;
                }
            };
            if pending.is_empty() {
                continue;
            }

            tracing::debug!(
                channel = %channel.name(),
                pending = pending.len(),
                "Channel due for delivery"
            );
            self.dispatcher.spawn(pending, resolved, DispatchMode::Scheduled);
            spawned += 1;
        }

        spawned
    }
}

/// Background task that runs scheduled delivery on an interval or on demand
pub struct DeliveryTask {
    delivery: ScheduledDelivery,
    interval: Duration,
    force: mpsc::Receiver<ForceSignal>,
    shutdown: broadcast::Receiver<()>,
    reporter: TaskReporter,
}

impl DeliveryTask {
    pub fn new(
        delivery: ScheduledDelivery,
        interval: Duration,
        force: mpsc::Receiver<ForceSignal>,
        shutdown: broadcast::Receiver<()>,
        reporter: TaskReporter,
    ) -> Self {
        Self {
            delivery,
            interval,
            force,
            shutdown,
            reporter,
        }
    }

    pub async fn run(self) {
        let Self {
            delivery,
            interval,
            mut force,
            mut shutdown,
            reporter,
        } = self;

        let mut timer = tokio::time::interval(interval);
        // Skip immediate first tick
        timer.tick().await;

        let _running = reporter.started();
        tracing::info!(interval_secs = interval.as_secs(), "Notification delivery started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Notification delivery received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    delivery.deliver_due(Utc::now()).await;
                }
                signal = force.recv() => {
                    let Some(done) = signal else {
                        break;
                    };
                    delivery.deliver_due(Utc::now()).await;
                    let _ = done.send(());
                }
            }
        }

        tracing::info!("Notification delivery stopped");
    }
}
