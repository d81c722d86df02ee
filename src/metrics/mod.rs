//! Prometheus metrics for the realtime layer.
//!
//! This module tracks:
//! - Info channel metrics (frames received/dropped, events published, opens)
//! - Reconnect supervisor metrics
//! - Notification mailbox metrics

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::Result;

/// Prefix for all metrics
const METRIC_PREFIX: &str = "mlc";

lazy_static! {
    // ============================================================================
    // Info Channel Metrics
    // ============================================================================

    /// Total text frames handed to the decoder
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_info_frames_received_total", METRIC_PREFIX),
        "Total info frames received from the engine"
    ).unwrap();

    /// Frames discarded because they could not be decoded
    pub static ref FRAMES_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_info_frames_dropped_total", METRIC_PREFIX),
        "Total info frames dropped by the decoder",
        &["reason"]
    ).unwrap();

    /// Events published to the cell, by tag
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_info_events_published_total", METRIC_PREFIX),
        "Total info events published to subscribers",
        &["event"]
    ).unwrap();

    /// Successful channel opens
    pub static ref CHANNEL_OPENS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_channel_opens_total", METRIC_PREFIX),
        "Total info channel connections established"
    ).unwrap();

    /// Failed channel opens
    pub static ref CHANNEL_OPEN_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_channel_open_failures_total", METRIC_PREFIX),
        "Total info channel connection attempts that failed"
    ).unwrap();

    /// Currently open channels
    pub static ref CHANNELS_OPEN: IntGauge = register_int_gauge!(
        format!("{}_channels_open", METRIC_PREFIX),
        "Number of info channels with a running reader"
    ).unwrap();

    // ============================================================================
    // Supervisor Metrics
    // ============================================================================

    /// Reconnect attempts scheduled by the supervisor
    pub static ref RECONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_channel_reconnect_attempts_total", METRIC_PREFIX),
        "Total reconnect attempts scheduled by the channel supervisor"
    ).unwrap();

    // ============================================================================
    // Mailbox Metrics
    // ============================================================================

    pub static ref NOTIFICATIONS_PUSHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_pushed_total", METRIC_PREFIX),
        "Total notifications pushed to a mailbox"
    ).unwrap();

    pub static ref NOTIFICATIONS_PULLED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_pulled_total", METRIC_PREFIX),
        "Total notifications pulled from a mailbox"
    ).unwrap();

    pub static ref MAILBOX_RESETS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_mailbox_resets_total", METRIC_PREFIX),
        "Total mailbox resets that cleared pending notifications"
    ).unwrap();

    /// Pending notifications after the last mailbox operation
    pub static ref MAILBOX_PENDING: IntGauge = register_int_gauge!(
        format!("{}_mailbox_pending", METRIC_PREFIX),
        "Pending notifications in the most recently changed mailbox"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
