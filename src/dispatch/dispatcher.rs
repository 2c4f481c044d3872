use std::borrow::Cow;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::metrics::DispatchMetrics;
use crate::notification::StoredNotification;
use crate::notifier::{Notifier, NotifierRegistry};
use crate::routing::{Channel, ResolvedChannel};
use crate::store::{NotificationStore, StoreError};

use super::failures::{DeliveryError, DeliveryFailures};

/// Which notifiers a dispatch uses and whether it settles the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Channel is immediate or the notification is urgent: every notifier,
    /// then mark delivered
    Immediate,
    /// Only notifiers that opted into immediate sending; the batch stays
    /// pending for the scheduled run
    NotifierOverride,
    /// Scheduled run: every notifier except those already served at ingestion,
    /// then mark delivered
    Scheduled,
}

impl DispatchMode {
    /// Label used in logs and metrics
    pub fn trigger(&self) -> &'static str {
        match self {
            DispatchMode::Immediate => "immediate",
            DispatchMode::NotifierOverride => "notifier_override",
            DispatchMode::Scheduled => "scheduled",
        }
    }

    /// The part of `batch` that `notifier` receives; `None` skips the notifier
    fn batch_for<'a>(
        &self,
        notifier: &dyn Notifier,
        channel: &Channel,
        batch: &'a [StoredNotification],
    ) -> Option<Cow<'a, [StoredNotification]>> {
        let eager = notifier.should_send_immediately();
        match self {
            DispatchMode::Immediate => Some(Cow::Borrowed(batch)),
            DispatchMode::NotifierOverride if eager => Some(Cow::Borrowed(batch)),
            DispatchMode::NotifierOverride => None,
            DispatchMode::Scheduled if !eager || channel.should_send_immediately() => {
                Some(Cow::Borrowed(batch))
            }
            // The ingestion override already served eager notifiers every
            // non-urgent notification of a scheduled channel.
            DispatchMode::Scheduled => {
                let missed: Vec<StoredNotification> = batch
                    .iter()
                    .filter(|n| n.notification.is_urgent())
                    .cloned()
                    .collect();
                (!missed.is_empty()).then_some(Cow::Owned(missed))
            }
        }
    }

    /// Whether the dispatch settles the batch, and so must hold a claim on it
    pub fn marks_delivered(&self) -> bool {
        !matches!(self, DispatchMode::NotifierOverride)
    }
}

/// Outcome of a dispatch where every attempted send succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Notifications in the batch
    pub notifications: usize,
    /// (subscriber, notifier) pairs attempted
    pub sends: usize,
    /// Notifications whose delivered flag this dispatch set
    pub marked_delivered: u64,
}

/// Statistics for the dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Batches dispatched
    pub batches: AtomicU64,
    /// Successful notifier sends
    pub sends_ok: AtomicU64,
    /// Failed notifier sends
    pub sends_failed: AtomicU64,
    /// Notifier names that were not registered when a channel referenced them
    pub notifiers_missing: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            sends_ok: self.sends_ok.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            notifiers_missing: self.notifiers_missing.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub batches: u64,
    pub sends_ok: u64,
    pub sends_failed: u64,
    pub notifiers_missing: u64,
}

/// Fans notification batches out to subscribers through the channel's notifiers.
///
/// Every notification a settling dispatch is working on is claimed first.
/// A claimed notification is not handed to another dispatch until the one
/// holding it has finished and set its delivered flag.
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    notifiers: Arc<NotifierRegistry>,
    stats: DispatcherStats,
    in_flight: AtomicUsize,
    claimed: Mutex<HashSet<i64>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, notifiers: Arc<NotifierRegistry>) -> Self {
        Self {
            store,
            notifiers,
            stats: DispatcherStats::default(),
            in_flight: AtomicUsize::new(0),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn notifiers(&self) -> &Arc<NotifierRegistry> {
        &self.notifiers
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of spawned dispatches that have not finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Load the channel's undelivered notifications and claim the ones no
    /// running dispatch holds. Only the newly claimed ones are returned.
    pub async fn claim_undelivered(
        &self,
        channel: &str,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        // Listed under the lock so a release cannot land between the read and
        // the claim.
        let mut claimed = self.claimed.lock().await;
        let pending = self.store.list_undelivered(channel).await?;
        Ok(pending
            .into_iter()
            .filter(|notification| claimed.insert(notification.id))
            .collect())
    }

    /// Claim a single notification. Returns `false` if it is already held.
    pub async fn claim(&self, notification: &StoredNotification) -> bool {
        self.claimed.lock().await.insert(notification.id)
    }

    /// Number of notifications currently held by running dispatches
    pub async fn claimed(&self) -> usize {
        self.claimed.lock().await.len()
    }

    async fn release(&self, ids: &[i64]) {
        let mut claimed = self.claimed.lock().await;
        for id in ids {
            claimed.remove(id);
        }
    }

    /// Whether any of the channel's notifiers opted into immediate sending
    pub fn has_immediate_notifier(&self, resolved: &ResolvedChannel) -> bool {
        resolved
            .channel
            .notifiers()
            .iter()
            .filter_map(|name| self.notifiers.get(name))
            .any(|notifier| notifier.should_send_immediately())
    }

    /// Send `batch` to every resolved subscriber through every notifier the
    /// channel lists, in configuration order.
    ///
    /// A failed send never stops the remaining ones. Unless the mode is
    /// `NotifierOverride`, the whole batch is marked delivered afterwards,
    /// including when some sends failed; those failures are then returned as
    /// `DeliveryError::PartialFailure`.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, batch, resolved),
        fields(
            channel = %resolved.channel.name(),
            trigger = mode.trigger(),
            batch_size = batch.len()
        )
    )]
    pub async fn dispatch(
        &self,
        batch: &[StoredNotification],
        resolved: &ResolvedChannel,
        mode: DispatchMode,
    ) -> Result<DispatchReport, DeliveryError> {
        if batch.is_empty() {
            return Ok(DispatchReport::default());
        }

        let channel_name = resolved.channel.name();
        let ids: Vec<i64> = batch.iter().map(|n| n.id).collect();
        let mut failures = DeliveryFailures::new(ids.clone());
        let mut sends = 0;

        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_dispatch(mode.trigger(), batch.len());

        for subscriber in &resolved.subscribers {
            for notifier_name in resolved.channel.notifiers() {
                let Some(notifier) = self.notifiers.get(notifier_name) else {
                    self.stats.notifiers_missing.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        channel = %channel_name,
                        notifier = %notifier_name,
                        "Notifier not found, skipping"
                    );
                    continue;
                };

                let Some(part) = mode.batch_for(notifier.as_ref(), &resolved.channel, batch)
                else {
                    continue;
                };

                sends += 1;
                match notifier.send(&part, subscriber).await {
                    Ok(()) => {
                        self.stats.sends_ok.fetch_add(1, Ordering::Relaxed);
                        DispatchMetrics::record_send_success(notifier_name);
                        tracing::debug!(
                            channel = %channel_name,
                            subscriber = %subscriber.unique_name,
                            notifier = %notifier_name,
                            "Notifications sent"
                        );
                    }
                    Err(e) => {
                        self.stats.sends_failed.fetch_add(1, Ordering::Relaxed);
                        DispatchMetrics::record_send_failure(notifier_name);
                        tracing::error!(
                            channel = %channel_name,
                            subscriber = %subscriber.unique_name,
                            notifier = %notifier_name,
                            error = %e,
                            "Failed to send notifications"
                        );
                        failures.record(subscriber.unique_name.clone(), e);
                    }
                }
            }
        }

        let marked_delivered = if mode.marks_delivered() {
            match self.store.mark_delivered(&ids).await {
                Ok(marked) => marked,
                Err(source) => {
                    return Err(DeliveryError::Store {
                        source,
                        failures: failures.has_errors().then_some(failures),
                    });
                }
            }
        } else {
            0
        };

        tracing::debug!(
            channel = %channel_name,
            sends = sends,
            failed = failures.errors().len(),
            marked_delivered = marked_delivered,
            "Dispatch completed"
        );

        if failures.has_errors() {
            return Err(DeliveryError::PartialFailure(failures));
        }

        Ok(DispatchReport {
            notifications: batch.len(),
            sends,
            marked_delivered,
        })
    }

    /// Run `dispatch` on its own task; the outcome is logged.
    ///
    /// For modes that mark the batch delivered, the caller must have claimed
    /// the batch; the claim is released once the dispatch has finished.
    pub fn spawn(
        self: &Arc<Self>,
        batch: Vec<StoredNotification>,
        resolved: ResolvedChannel,
        mode: DispatchMode,
    ) -> JoinHandle<()> {
        let guard = InFlightGuard::new(self.clone());

        tokio::spawn(async move {
            let dispatcher = guard.dispatcher.clone();
            let channel = resolved.channel.name().to_string();
            let ids: Vec<i64> = batch.iter().map(|n| n.id).collect();

            let outcome = AssertUnwindSafe(dispatcher.dispatch(&batch, &resolved, mode))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(report)) => {
                    tracing::debug!(
                        channel = %channel,
                        trigger = mode.trigger(),
                        notifications = report.notifications,
                        sends = report.sends,
                        "Dispatch task finished"
                    );
                }
                Ok(Err(DeliveryError::PartialFailure(failures))) => {
                    tracing::error!(
                        channel = %channel,
                        trigger = mode.trigger(),
                        failed_subscribers = failures.errors().len(),
                        error = %failures,
                        "Notifications failed to send to some subscribers"
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        channel = %channel,
                        trigger = mode.trigger(),
                        error = %e,
                        send_failures = ?e.failures().map(ToString::to_string),
                        "Dispatch task failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        channel = %channel,
                        trigger = mode.trigger(),
                        "Dispatch task panicked"
                    );
                }
            }

            if mode.marks_delivered() {
                dispatcher.release(&ids).await;
            }
            drop(guard);
        })
    }

    /// Wait until no spawned dispatch is running. Returns `false` on timeout.
    pub async fn wait_idle(&self, within: Duration) -> bool {
        if self.in_flight() == 0 {
            return true;
        }

        let drain = async {
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if self.in_flight() == 0 {
                    break;
                }
            }
        };

        match timeout(within, drain).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    in_flight = self.in_flight(),
                    "Dispatch drain timeout, some sends may not have completed"
                );
                false
            }
        }
    }
}

/// Counts a spawned dispatch as in flight until dropped
struct InFlightGuard {
    dispatcher: Arc<Dispatcher>,
}

impl InFlightGuard {
    fn new(dispatcher: Arc<Dispatcher>) -> Self {
        dispatcher.in_flight.fetch_add(1, Ordering::AcqRel);
        DispatchMetrics::inc_in_flight();
        Self { dispatcher }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.dispatcher.in_flight.fetch_sub(1, Ordering::AcqRel);
        DispatchMetrics::dec_in_flight();
    }
}
