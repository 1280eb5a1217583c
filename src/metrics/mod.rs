//! Prometheus metrics for the mail service.
//!
//! - Delivery metrics (accepted, delivered, exhausted, failed by stage)
//! - Send attempts and SMTP latency
//! - Template store size

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, FailureStage};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "mail_manager";

lazy_static! {
    /// Recipients accepted by the send endpoint
    pub static ref EMAILS_ACCEPTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_accepted_total", METRIC_PREFIX),
        "Total recipients accepted for delivery"
    ).unwrap();

    /// Messages the SMTP server accepted
    pub static ref EMAILS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_delivered_total", METRIC_PREFIX),
        "Total messages successfully handed to the SMTP server"
    ).unwrap();

    /// Messages given up on after the retry ceiling
    pub static ref EMAILS_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_exhausted_total", METRIC_PREFIX),
        "Total messages abandoned after exhausting retries"
    ).unwrap();

    /// Messages that failed without retry, by pipeline stage
    pub static ref EMAILS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_failed_total", METRIC_PREFIX),
        "Total messages that failed permanently",
        &["stage"]
    ).unwrap();

    /// Individual SMTP send attempts, including retries
    pub static ref SEND_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_send_attempts_total", METRIC_PREFIX),
        "Total SMTP send attempts"
    ).unwrap();

    /// Duration of a single SMTP send attempt
    pub static ref SEND_DURATION_SECONDS: Histogram = register_histogram!(
        format!("{}_send_duration_seconds", METRIC_PREFIX),
        "SMTP send attempt duration in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Templates currently loaded
    pub static ref TEMPLATES_LOADED: IntGauge = register_int_gauge!(
        format!("{}_templates_loaded", METRIC_PREFIX),
        "Number of templates in the template store"
    ).unwrap();

    /// Delivery tasks currently running
    pub static ref DELIVERIES_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_deliveries_in_flight", METRIC_PREFIX),
        "Number of delivery tasks currently running"
    ).unwrap();
}
