//! Notifier that renders messages and writes them to the log.

use async_trait::async_trait;
use chrono::SecondsFormat;

use crate::notification::{StoredNotification, Subscriber};

use super::{Notifier, NotifierError};

pub const LOG_NOTIFIER_NAME: &str = "log";

/// Subject and body of a rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Render a batch into one message.
///
/// A single notification keeps its own subject; several notifications become a
/// digest listing each of them. Returns `None` for an empty batch.
pub fn render_message(notifications: &[StoredNotification]) -> Option<RenderedMessage> {
    match notifications {
        [] => None,
        [single] => {
            let n = &single.notification;
            Some(RenderedMessage {
                subject: format!("[{}][{}] {}", n.channel, n.origin, n.subject),
                body: format!("{}\n\nCreated At: {}", n.content.trim(), timestamp(single)),
            })
        }
        [first, ..] => {
            let body = notifications
                .iter()
                .map(|stored| {
                    let n = &stored.notification;
                    format!(
                        "# [{}] {} #\n\n{}\n\nCreated At: {}",
                        n.origin,
                        n.subject,
                        n.content.trim(),
                        timestamp(stored)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");

            Some(RenderedMessage {
                subject: format!(
                    "[{}] Received {} notifications",
                    first.channel(),
                    notifications.len()
                ),
                body,
            })
        }
    }
}

fn timestamp(stored: &StoredNotification) -> String {
    stored
        .notification
        .created_at
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Notifier that never leaves the process: it renders the message it would
/// send and emits it as an `info` event.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        LOG_NOTIFIER_NAME
    }

    async fn send(
        &self,
        notifications: &[StoredNotification],
        subscriber: &Subscriber,
    ) -> Result<(), NotifierError> {
        let Some(message) = render_message(notifications) else {
            return Ok(());
        };

        tracing::info!(
            notifier = LOG_NOTIFIER_NAME,
            subscriber = %subscriber.unique_name,
            to = %subscriber.email,
            subject = %message.subject,
            body = %message.body,
            "Notification message"
        );
        Ok(())
    }
}
