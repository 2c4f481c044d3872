use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::notification::Subscriber;

use super::channel::{Channel, ChannelDefinition};

/// Errors that can occur while loading or reloading the routing config.
///
/// A failed reload never replaces the active snapshot.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("could not read routing config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse routing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("channel '{channel}' has an invalid time_to_notify '{expression}'")]
    InvalidSchedule { channel: String, expression: String },
}

/// On-disk representation of the routing config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSource {
    #[serde(default)]
    pub channels: Vec<ChannelDefinition>,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

/// Channel and subscriber maps sourced from one load.
///
/// Snapshots are immutable; a reload installs a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingSnapshot {
    channels: HashMap<String, Arc<Channel>>,
    subscribers: HashMap<String, Subscriber>,
}

impl RoutingSnapshot {
    /// Validate every channel of `source` and index both lists by name.
    pub fn from_source(source: RoutingSource) -> Result<Self, ReloadError> {
        let mut channels = HashMap::with_capacity(source.channels.len());
        for definition in source.channels {
            let name = definition.name.clone();
            let expression = definition.time_to_notify.clone();
            let channel = Channel::from_definition(definition).map_err(|e| {
                tracing::warn!(
                    channel = %name,
                    time_to_notify = %expression,
                    error = %e,
                    "Failed to parse channel schedule"
                );
                ReloadError::InvalidSchedule {
                    channel: name.clone(),
                    expression,
                }
            })?;
            channels.insert(name, Arc::new(channel));
        }

        let subscribers = source
            .subscribers
            .into_iter()
            .map(|subscriber| (subscriber.unique_name.clone(), subscriber))
            .collect();

        Ok(Self {
            channels,
            subscribers,
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ReloadError> {
        Self::from_source(serde_json::from_slice(bytes)?)
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<Channel>> {
        self.channels.get(name)
    }

    pub fn subscriber(&self, unique_name: &str) -> Option<&Subscriber> {
        self.subscribers.get(unique_name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.channels.values()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.values()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Resolve a channel's subscriber names against this snapshot.
    ///
    /// Names that no longer resolve are skipped with a warning.
    pub fn resolve(&self, channel_name: &str) -> Option<ResolvedChannel> {
        let channel = self.channels.get(channel_name)?.clone();

        let subscribers = channel
            .subscribers()
            .iter()
            .filter_map(|name| {
                let subscriber = self.subscribers.get(name);
                if subscriber.is_none() {
                    tracing::warn!(
                        channel = %channel_name,
                        subscriber = %name,
                        "Subscriber not found, skipping"
                    );
                }
                subscriber.cloned()
            })
            .collect();

        Some(ResolvedChannel {
            channel,
            subscribers,
        })
    }
}

/// A channel and the subscriber records it resolved to, copied out of one snapshot
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub channel: Arc<Channel>,
    pub subscribers: Vec<Subscriber>,
}

/// Hot-reloadable routing configuration.
///
/// One mutex guards the active snapshot. Both the reload swap and the
/// resolve step take it, so a reader never pairs a channel map with a
/// subscriber map from a different load. The lock is only held for map
/// lookups and pointer swaps, never across file I/O or notifier sends.
pub struct RoutingConfig {
    source: PathBuf,
    snapshot: Mutex<Arc<RoutingSnapshot>>,
}

impl RoutingConfig {
    /// Load the routing config from `path`, failing fast on invalid channels.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ReloadError> {
        let source = path.as_ref().to_path_buf();
        let snapshot = read_snapshot(&source).await?;

        tracing::info!(
            path = %source.display(),
            channels = snapshot.channel_count(),
            subscribers = snapshot.subscriber_count(),
            "Routing config loaded"
        );

        Ok(Self {
            source,
            snapshot: Mutex::new(Arc::new(snapshot)),
        })
    }

    /// Build a config around an in-memory snapshot.
    ///
    /// `reload()` will read from `source` when called.
    pub fn from_snapshot(source: impl Into<PathBuf>, snapshot: RoutingSnapshot) -> Self {
        Self {
            source: source.into(),
            snapshot: Mutex::new(Arc::new(snapshot)),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Re-read the source and atomically replace both maps.
    ///
    /// On failure the previous snapshot stays active.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let snapshot = read_snapshot(&self.source).await?;
        let (channels, subscribers) = (snapshot.channel_count(), snapshot.subscriber_count());
        self.install(snapshot).await;

        tracing::info!(
            path = %self.source.display(),
            channels = channels,
            subscribers = subscribers,
            "Routing config reloaded"
        );
        Ok(())
    }

    /// Replace the active snapshot.
    pub async fn install(&self, snapshot: RoutingSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.lock().await = snapshot;
    }

    /// The active snapshot; later reloads do not affect the returned value.
    pub async fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.lock().await.clone()
    }

    /// Resolve a channel and its subscribers under the lock, then release it.
    pub async fn resolve(&self, channel_name: &str) -> Option<ResolvedChannel> {
        let snapshot = self.snapshot.lock().await;
        snapshot.resolve(channel_name)
    }

    /// Current channels, ordered by name
    pub async fn channels(&self) -> Vec<Arc<Channel>> {
        let snapshot = self.snapshot().await;
        let mut channels: Vec<_> = snapshot.channels().cloned().collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    /// Current subscribers, ordered by unique name
    pub async fn subscribers(&self) -> Vec<Subscriber> {
        let snapshot = self.snapshot().await;
        let mut subscribers: Vec<_> = snapshot.subscribers().cloned().collect();
        subscribers.sort_by(|a, b| a.unique_name.cmp(&b.unique_name));
        subscribers
    }
}

async fn read_snapshot(path: &Path) -> Result<RoutingSnapshot, ReloadError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    RoutingSnapshot::from_json(&bytes)
}
