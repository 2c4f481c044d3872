//! Prometheus metrics for the notification relay.
//!
//! - Ingestion metrics (notifications queued by priority)
//! - Dispatch metrics (batches by trigger, notifier sends by outcome, in-flight gauge)
//! - Routing config reload metrics

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, IngestMetrics, ReloadMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "herald";

lazy_static! {
    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Notifications accepted and persisted
    pub static ref NOTIFICATIONS_QUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_queued_total", METRIC_PREFIX),
        "Total notifications accepted and persisted",
        &["priority"]
    ).unwrap();

    /// Notifications addressed to a channel missing from the routing config
    pub static ref NOTIFICATIONS_UNROUTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_unrouted_total", METRIC_PREFIX),
        "Total notifications whose channel was not found"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatch batches started by trigger
    pub static ref DISPATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatches_total", METRIC_PREFIX),
        "Total dispatch batches started",
        &["trigger"]
    ).unwrap();

    /// Notifier send attempts by notifier and outcome
    pub static ref NOTIFIER_SENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifier_sends_total", METRIC_PREFIX),
        "Total notifier send attempts",
        &["notifier", "outcome"]
    ).unwrap();

    /// Number of dispatch tasks currently running
    pub static ref DISPATCHES_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_dispatches_in_flight", METRIC_PREFIX),
        "Number of dispatch tasks currently running"
    ).unwrap();

    /// Batch size handed to notifiers
    pub static ref DISPATCH_BATCH_SIZE: Histogram = register_histogram!(
        format!("{}_dispatch_batch_size", METRIC_PREFIX),
        "Distribution of notifications per dispatch batch",
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0]
    ).unwrap();

    // ============================================================================
    // Routing Config Metrics
    // ============================================================================

    /// Routing config reloads by outcome
    pub static ref CONFIG_RELOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_config_reloads_total", METRIC_PREFIX),
        "Total routing config reloads",
        &["outcome"]
    ).unwrap();

    /// Channels in the active routing snapshot
    pub static ref CHANNELS_CONFIGURED: IntGauge = register_int_gauge!(
        format!("{}_channels_configured", METRIC_PREFIX),
        "Number of channels in the active routing config"
    ).unwrap();
}
