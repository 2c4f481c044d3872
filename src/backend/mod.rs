//! Notification backend.
//!
//! The backend is the composition root handed to the ingestion gateway. It
//! owns the store, the routing config and the dispatcher, decides at
//! ingestion whether a notification is sent right away, and runs the
//! config reloader and scheduled delivery tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::{SchedulerSettings, Settings};
use crate::dispatch::{DispatchMode, Dispatcher, DispatcherStatsSnapshot};
use crate::error::{BackendError, Result};
use crate::metrics::{IngestMetrics, ReloadMetrics};
use crate::notification::{Notification, StoredNotification, Subscriber};
use crate::notifier::NotifierRegistry;
use crate::routing::{Channel, RoutingConfig, RoutingSnapshot};
use crate::store::{open_store, NotificationStore};
use crate::tasks::{
    ConfigReloadTask, DeliveryTask, ForceSignal, ScheduledDelivery, TaskRendezvous,
    BACKGROUND_TASKS,
};

/// Split an open string into its store location and routing config path.
pub fn parse_open_string(open_string: &str) -> Result<(&str, &str)> {
    let invalid = || BackendError::InvalidOpenString(open_string.to_string());

    let (store, config) = open_string.split_once(',').ok_or_else(invalid)?;
    let (store, config) = (store.trim(), config.trim());
    if store.is_empty() || config.is_empty() {
        return Err(invalid());
    }
    Ok((store, config))
}

/// Handles to the running background tasks
struct TaskControl {
    shutdown: broadcast::Sender<()>,
    force_reload: mpsc::Sender<ForceSignal>,
    force_delivery: mpsc::Sender<ForceSignal>,
    handles: Vec<JoinHandle<()>>,
}

pub struct NotificationBackend {
    routing: Arc<RoutingConfig>,
    dispatcher: Arc<Dispatcher>,
    never_send: bool,
    scheduler: SchedulerSettings,
    rendezvous: TaskRendezvous,
    control: Mutex<Option<TaskControl>>,
    started: AtomicBool,
}

impl NotificationBackend {
    /// Open the store and load the routing config named by `open_string`
    /// (`"<store-location>,<routing-config-path>"`).
    pub async fn initialize(
        open_string: &str,
        notifiers: Arc<NotifierRegistry>,
        settings: &Settings,
    ) -> Result<Self> {
        let (store_location, config_path) = parse_open_string(open_string)?;

        let store = open_store(store_location).await?;
        let routing = RoutingConfig::load(config_path).await?;
        ReloadMetrics::record_success(routing.snapshot().await.channel_count());

        tracing::info!(
            store = store.backend_name(),
            routing_config = %config_path,
            notifiers = ?notifiers.names(),
            never_send = settings.backend.never_send,
            "Notification backend initialized"
        );

        Ok(Self::new(store, Arc::new(routing), notifiers, settings))
    }

    /// Assemble a backend from already opened parts.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        routing: Arc<RoutingConfig>,
        notifiers: Arc<NotifierRegistry>,
        settings: &Settings,
    ) -> Self {
        Self {
            routing,
            dispatcher: Arc::new(Dispatcher::new(store, notifiers)),
            never_send: settings.backend.never_send,
            scheduler: settings.scheduler.clone(),
            rendezvous: TaskRendezvous::new(BACKGROUND_TASKS),
            control: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        self.dispatcher.store()
    }

    pub fn routing(&self) -> &Arc<RoutingConfig> {
        &self.routing
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Spawn the config reloader and scheduled delivery tasks.
    ///
    /// A backend can be started once; use [`block_until_ready`](Self::block_until_ready)
    /// to wait for both tasks to be running.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(BackendError::AlreadyStarted);
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let (force_reload_tx, force_reload_rx) = mpsc::channel(1);
        let (force_delivery_tx, force_delivery_rx) = mpsc::channel(1);

        let reloader = ConfigReloadTask::new(
            self.routing.clone(),
            self.scheduler.reload_interval(),
            force_reload_rx,
            shutdown_tx.subscribe(),
            self.rendezvous.reporter(),
        );
        let delivery = DeliveryTask::new(
            ScheduledDelivery::new(self.routing.clone(), self.dispatcher.clone(), self.never_send),
            self.scheduler.delivery_interval(),
            force_delivery_rx,
            shutdown_tx.subscribe(),
            self.rendezvous.reporter(),
        );

        let handles = vec![tokio::spawn(reloader.run()), tokio::spawn(delivery.run())];

        *self.control.lock().await = Some(TaskControl {
            shutdown: shutdown_tx,
            force_reload: force_reload_tx,
            force_delivery: force_delivery_tx,
            handles,
        });

        tracing::info!(tasks = BACKGROUND_TASKS, "Notification backend started");
        Ok(())
    }

    /// Wait until every background task reported that it is running.
    pub async fn block_until_ready(&self) {
        self.rendezvous.wait_started().await;
    }

    /// Persist a notification and, when due, dispatch it right away.
    ///
    /// The notification is always written first. It is then sent immediately
    /// when its channel is `@immediately` or it is urgent; otherwise notifiers
    /// that opted into immediate sending get it now and the rest wait for the
    /// channel's schedule. A channel missing from the routing config yields
    /// `ChannelNotFound` after the write.
    #[tracing::instrument(
        name = "backend.queue_notification",
        skip(self, notification),
        fields(channel = %notification.channel, priority = %notification.priority)
    )]
    pub async fn queue_notification(&self, notification: Notification) -> Result<StoredNotification> {
        let stored = self.dispatcher.store().insert(notification).await?;
        IngestMetrics::record_queued(stored.notification.priority);

        if self.never_send {
            tracing::debug!(id = stored.id, "Sending disabled, notification stored only");
            return Ok(stored);
        }

        let channel_name = stored.channel().to_string();
        let Some(resolved) = self.routing.resolve(&channel_name).await else {
            IngestMetrics::record_unrouted();
            tracing::warn!(
                id = stored.id,
                channel = %channel_name,
                "Notification stored for unknown channel"
            );
            return Err(BackendError::ChannelNotFound(channel_name));
        };

        let mode = if resolved.channel.should_send_immediately() || stored.notification.is_urgent() {
            Some(DispatchMode::Immediate)
        } else if self.dispatcher.has_immediate_notifier(&resolved) {
            Some(DispatchMode::NotifierOverride)
        } else {
            None
        };

        let Some(mode) = mode else {
            tracing::debug!(
                id = stored.id,
                time_to_notify = %resolved.channel.time_to_notify(),
                "Notification waiting for channel schedule"
            );
            return Ok(stored);
        };

        if mode.marks_delivered() && !self.dispatcher.claim(&stored).await {
            tracing::debug!(id = stored.id, "Notification already picked up by scheduled delivery");
            return Ok(stored);
        }

        tracing::debug!(id = stored.id, trigger = mode.trigger(), "Dispatching at ingestion");
        self.dispatcher.spawn(vec![stored.clone()], resolved, mode);

        Ok(stored)
    }

    /// Reload the routing config now and wait for the reload to finish.
    pub async fn force_config_reload(&self) -> Result<()> {
        let sender = self.force_sender(|control| control.force_reload.clone()).await?;
        Self::force(sender).await
    }

    /// Run scheduled delivery now and wait until its dispatches were spawned.
    pub async fn force_notification_delivery(&self) -> Result<()> {
        let sender = self.force_sender(|control| control.force_delivery.clone()).await?;
        Self::force(sender).await
    }

    async fn force_sender(
        &self,
        select: impl FnOnce(&TaskControl) -> mpsc::Sender<ForceSignal>,
    ) -> Result<mpsc::Sender<ForceSignal>> {
        self.control
            .lock()
            .await
            .as_ref()
            .map(select)
            .ok_or(BackendError::NotRunning)
    }

    async fn force(sender: mpsc::Sender<ForceSignal>) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        sender
            .send(done_tx)
            .await
            .map_err(|_| BackendError::NotRunning)?;
        done_rx.await.map_err(|_| BackendError::NotRunning)
    }

    /// Current routing snapshot; channels and subscribers come from the same load
    pub async fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.routing.snapshot().await
    }

    pub async fn channels(&self) -> Vec<Arc<Channel>> {
        self.routing.channels().await
    }

    pub async fn subscribers(&self) -> Vec<Subscriber> {
        self.routing.subscribers().await
    }

    /// Stop both background tasks, wait for them to exit, then give in-flight
    /// dispatches up to the drain timeout to finish.
    pub async fn shutdown(&self) {
        let Some(control) = self.control.lock().await.take() else {
            tracing::debug!("Backend not running, nothing to shut down");
            return;
        };

        tracing::info!("Shutting down notification backend");
        let TaskControl {
            shutdown,
            force_reload,
            force_delivery,
            handles,
        } = control;

        let _ = shutdown.send(());
        drop(force_reload);
        drop(force_delivery);

        self.rendezvous.wait_stopped().await;
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background task panicked");
            }
        }

        let drained = self.dispatcher.wait_idle(self.scheduler.drain_timeout()).await;
        tracing::info!(drained = drained, "Notification backend stopped");
    }
}
