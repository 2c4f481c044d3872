//! Pluggable delivery mechanisms.
//!
//! A notifier sends a whole batch of notifications to one subscriber at a
//! time so that it can render a digest instead of one message per
//! notification. Channels reference notifiers by name; the names are
//! resolved against a [`NotifierRegistry`] at dispatch time.

mod log_notifier;
#[cfg(any(test, feature = "test-util"))]
mod recording;
mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::{StoredNotification, Subscriber};

pub use log_notifier::{render_message, LogNotifier, RenderedMessage, LOG_NOTIFIER_NAME};
#[cfg(any(test, feature = "test-util"))]
pub use recording::{Delivery, RecordingNotifier, RECORDING_NOTIFIER_NAME};
pub use registry::NotifierRegistry;

/// Errors returned by a notifier's send operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifierError {
    #[error("{notifier} failed to send: {reason}")]
    Send { notifier: String, reason: String },
}

impl NotifierError {
    pub fn send(notifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Send {
            notifier: notifier.into(),
            reason: reason.into(),
        }
    }
}

/// A named delivery mechanism.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Registry key; unique per registry
    fn name(&self) -> &str;

    /// Send every notification at ingestion time, ignoring the channel schedule.
    fn should_send_immediately(&self) -> bool {
        false
    }

    /// Deliver `notifications` (all of one channel, oldest first) to `subscriber`.
    async fn send(
        &self,
        notifications: &[StoredNotification],
        subscriber: &Subscriber,
    ) -> Result<(), NotifierError>;
}
