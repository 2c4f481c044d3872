//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::notification::Priority;

use super::{
    CHANNELS_CONFIGURED, CONFIG_RELOADS_TOTAL, DISPATCHES_IN_FLIGHT, DISPATCHES_TOTAL,
    DISPATCH_BATCH_SIZE, NOTIFICATIONS_QUEUED_TOTAL, NOTIFICATIONS_UNROUTED_TOTAL,
    NOTIFIER_SENDS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording ingestion metrics
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_queued(priority: Priority) {
        NOTIFICATIONS_QUEUED_TOTAL
            .with_label_values(&[priority.as_str()])
            .inc();
    }

    /// Unlabeled; the channel name goes to the log instead
    pub fn record_unrouted() {
        NOTIFICATIONS_UNROUTED_TOTAL.inc();
    }
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a dispatch batch started by `trigger`
    pub fn record_dispatch(trigger: &str, batch_size: usize) {
        DISPATCHES_TOTAL.with_label_values(&[trigger]).inc();
        DISPATCH_BATCH_SIZE.observe(batch_size as f64);
    }

    pub fn record_send_success(notifier: &str) {
        NOTIFIER_SENDS_TOTAL
            .with_label_values(&[notifier, "success"])
            .inc();
    }

    pub fn record_send_failure(notifier: &str) {
        NOTIFIER_SENDS_TOTAL
            .with_label_values(&[notifier, "failure"])
            .inc();
    }

    pub fn inc_in_flight() {
        DISPATCHES_IN_FLIGHT.inc();
    }

    pub fn dec_in_flight() {
        DISPATCHES_IN_FLIGHT.dec();
    }
}

/// Helper struct for recording routing config metrics
pub struct ReloadMetrics;

impl ReloadMetrics {
    pub fn record_success(channels: usize) {
        CONFIG_RELOADS_TOTAL.with_label_values(&["success"]).inc();
        CHANNELS_CONFIGURED.set(channels as i64);
    }

    pub fn record_failure() {
        CONFIG_RELOADS_TOTAL.with_label_values(&["failure"]).inc();
    }
}
