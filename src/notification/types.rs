use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification accepted from an upstream producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Short subject line
    pub subject: String,
    /// Body content
    pub content: String,
    /// Destination channel name
    pub channel: String,
    /// Identifier of the producer that submitted it
    pub origin: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Priority level
    #[serde(default)]
    pub priority: Priority,
    /// When the notification was accepted
    pub created_at: DateTime<Utc>,
    /// Last modification (set again when delivered)
    pub updated_at: DateTime<Utc>,
    /// Whether the notification has been dispatched
    #[serde(default)]
    pub delivered: bool,
}

/// A notification together with its store-assigned identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: i64,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Reserved for future use
    Low,
    /// Regular notifications (default)
    #[default]
    Normal,
    /// Bypasses the channel schedule
    Urgent,
}

/// A recipient of notifications, referenced by channels through `unique_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Primary key used by channel subscriber lists
    pub unique_name: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Builder for creating notifications
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    channel: String,
    origin: String,
    subject: String,
    content: String,
    tags: Vec<String>,
    priority: Priority,
}

impl NotificationBuilder {
    /// Create a new notification builder
    pub fn new(channel: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            origin: origin.into(),
            subject: String::new(),
            content: String::new(),
            tags: Vec::new(),
            priority: Priority::default(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Build the notification, stamping both timestamps with the current time
    pub fn build(self) -> Notification {
        let now = Utc::now();
        Notification {
            subject: self.subject,
            content: self.content,
            channel: self.channel,
            origin: self.origin,
            tags: self.tags,
            priority: self.priority,
            created_at: now,
            updated_at: now,
            delivered: false,
        }
    }
}

impl Notification {
    /// Create a builder for a notification addressed to `channel`
    pub fn builder(channel: impl Into<String>, origin: impl Into<String>) -> NotificationBuilder {
        NotificationBuilder::new(channel, origin)
    }

    /// Urgent notifications are dispatched at ingestion regardless of schedule
    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }
}

impl StoredNotification {
    pub fn channel(&self) -> &str {
        &self.notification.channel
    }
}

impl Priority {
    /// Integer code used by persistent stores
    pub fn as_code(&self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::Urgent => 100,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            100 => Some(Priority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::Urgent => "urgent",
        }
    }

    /// Parse a producer-supplied priority, falling back to `Normal` for unknown values
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_code().cmp(&other.as_code())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a priority string is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority '{0}'")]
pub struct UnknownPriority(pub String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(UnknownPriority(s.to_string())),
        }
    }
}

impl Subscriber {
    pub fn new(unique_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            name: name.into(),
            email: String::new(),
            phone_number: String::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}
