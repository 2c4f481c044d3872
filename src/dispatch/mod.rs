//! Dispatch pipeline.
//!
//! A dispatch takes a batch of undelivered notifications of one channel and
//! the channel's resolved subscribers, hands the batch to every notifier for
//! every subscriber, and then marks the batch delivered. Delivery is
//! at-least-once: a failed send is reported but not retried, and the batch is
//! marked delivered regardless.
//!
//! A notification is claimed by the dispatch that settles it, so overlapping
//! delivery passes and ingestion never send it twice.

mod dispatcher;
mod failures;

pub use dispatcher::{
    DispatchMode, DispatchReport, Dispatcher, DispatcherStats, DispatcherStatsSnapshot,
};
pub use failures::{DeliveryError, DeliveryFailures};
