//! Channel routing configuration.
//!
//! The routing config maps channel names to their subscriber lists, notifier
//! lists and delivery schedules, and subscriber unique names to subscriber
//! records. It is loaded from a JSON file and reloaded from the same path:
//!
//! ```json
//! {
//!   "channels": [
//!     {"name": "ops", "subscribers": ["jimmy"], "notifiers": ["log"], "time_to_notify": "@hourly"}
//!   ],
//!   "subscribers": [
//!     {"unique_name": "jimmy", "name": "Jimmy the Cat", "email": "jimmy@the.cat"}
//!   ]
//! }
//! ```

mod channel;
mod config;

pub use channel::{Channel, ChannelDefinition};
pub use config::{ReloadError, ResolvedChannel, RoutingConfig, RoutingSnapshot, RoutingSource};
