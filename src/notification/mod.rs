//! Notification and subscriber domain types.

mod types;

pub use types::{
    Notification, NotificationBuilder, Priority, StoredNotification, Subscriber, UnknownPriority,
};
