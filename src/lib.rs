// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Domain
pub mod notification;
pub mod routing;
pub mod schedule;
pub mod store;

// Delivery
pub mod dispatch;
pub mod notifier;

// Service
pub mod backend;
pub mod tasks;

pub use backend::NotificationBackend;
pub use error::{BackendError, Result};
