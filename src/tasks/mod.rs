//! Long-lived background tasks.
//!
//! Two tasks run for the lifetime of a started backend: the config reloader
//! and scheduled delivery. Each waits on its interval timer, a force signal
//! and the shared shutdown broadcast, and reports its start and exit to a
//! [`TaskRendezvous`].

mod config_reload;
mod delivery;
mod readiness;

pub use config_reload::{reload_logging_errors, ConfigReloadTask, ForceSignal};
pub use delivery::{DeliveryTask, ScheduledDelivery};
pub use readiness::{RunningTask, TaskRendezvous, TaskReporter};

/// Number of long-lived tasks a backend starts
pub const BACKGROUND_TASKS: usize = 2;
