//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    DELIVERIES_IN_FLIGHT, EMAILS_ACCEPTED_TOTAL, EMAILS_DELIVERED_TOTAL, EMAILS_EXHAUSTED_TOTAL,
    EMAILS_FAILED_TOTAL, SEND_ATTEMPTS_TOTAL, SEND_DURATION_SECONDS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Pipeline stage at which a delivery failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Render,
    Inline,
    Transport,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Render => "render",
            FailureStage::Inline => "inline",
            FailureStage::Transport => "transport",
        }
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_accepted(count: u64) {
        EMAILS_ACCEPTED_TOTAL.inc_by(count);
    }

    pub fn record_delivered() {
        EMAILS_DELIVERED_TOTAL.inc();
    }

    pub fn record_exhausted() {
        EMAILS_EXHAUSTED_TOTAL.inc();
    }

    pub fn record_failed(stage: FailureStage) {
        EMAILS_FAILED_TOTAL.with_label_values(&[stage.as_str()]).inc();
    }

    /// Record one SMTP attempt and how long it took
    pub fn record_attempt(duration: Duration) {
        SEND_ATTEMPTS_TOTAL.inc();
        SEND_DURATION_SECONDS.observe(duration.as_secs_f64());
    }

    pub fn task_started() {
        DELIVERIES_IN_FLIGHT.inc();
    }

    pub fn task_finished() {
        DELIVERIES_IN_FLIGHT.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_metrics_contain_delivery_counters() {
        DeliveryMetrics::record_accepted(1);
        DeliveryMetrics::record_failed(FailureStage::Render);

        let output = encode_metrics().unwrap();
        assert!(output.contains("mail_manager_emails_accepted_total"));
        assert!(output.contains("mail_manager_emails_failed_total"));
    }
}
