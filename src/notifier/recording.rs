//! In-process notifier that records every send attempt.
//!
//! Useful as a stand-in for a real delivery mechanism when exercising the
//! dispatch path: it can be told to fail for specific subscribers, to opt
//! into the immediate-send override, or to hold each send for a while.
//! Only built for tests and with the `test-util` feature.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::notification::{StoredNotification, Subscriber};

use super::{Notifier, NotifierError};

pub const RECORDING_NOTIFIER_NAME: &str = "testnotify";

/// One recorded send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub notifications: Vec<StoredNotification>,
    pub subscriber: Subscriber,
    pub succeeded: bool,
}

impl Delivery {
    pub fn notification_ids(&self) -> Vec<i64> {
        self.notifications.iter().map(|n| n.id).collect()
    }
}

#[derive(Debug)]
pub struct RecordingNotifier {
    name: String,
    send_immediately: bool,
    failing: HashSet<String>,
    delay: Option<Duration>,
    deliveries: Mutex<Vec<Delivery>>,
    recorded: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::with_name(RECORDING_NOTIFIER_NAME)
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            send_immediately: false,
            failing: HashSet::new(),
            delay: None,
            deliveries: Mutex::new(Vec::new()),
            recorded: Notify::new(),
        }
    }

    /// Opt into the immediate-send override
    pub fn immediate(mut self) -> Self {
        self.send_immediately = true;
        self
    }

    /// Fail every send addressed to `unique_name`
    pub fn failing_for(mut self, unique_name: impl Into<String>) -> Self {
        self.failing.insert(unique_name.into());
        self
    }

    /// Hold every send for `delay` after recording it
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All attempts so far, failed ones included
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    pub async fn attempts(&self) -> usize {
        self.deliveries.lock().await.len()
    }

    /// Wait until at least `count` attempts were recorded.
    ///
    /// Returns `false` if `within` elapses first.
    pub async fn wait_for(&self, count: usize, within: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.recorded.notified();
                if self.attempts().await >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(within, wait).await.is_ok()
    }

    pub async fn reset(&self) {
        self.deliveries.lock().await.clear();
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_send_immediately(&self) -> bool {
        self.send_immediately
    }

    async fn send(
        &self,
        notifications: &[StoredNotification],
        subscriber: &Subscriber,
    ) -> Result<(), NotifierError> {
        let succeeded = !self.failing.contains(&subscriber.unique_name);

        self.deliveries.lock().await.push(Delivery {
            notifications: notifications.to_vec(),
            subscriber: subscriber.clone(),
            succeeded,
        });
        self.recorded.notify_waiters();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if succeeded {
            Ok(())
        } else {
            Err(NotifierError::send(
                &self.name,
                format!("delivery to {} refused", subscriber.unique_name),
            ))
        }
    }
}
