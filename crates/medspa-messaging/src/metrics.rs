// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery-worker metrics.

use metrics::describe_counter;

pub fn register_metrics() {
    describe_counter!(
        "medspa_sms_retry_attempts_total",
        "Outbound SMS resend attempts, by outcome"
    );
    describe_counter!(
        "medspa_sms_sends_total",
        "First-attempt outbound SMS sends, by outcome"
    );
    describe_counter!(
        "medspa_hosted_orders_updated_total",
        "Hosted-number orders refreshed, by provider status"
    );
}

pub fn record_retry(outcome: &str) {
    metrics::counter!("medspa_sms_retry_attempts_total", "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_send(outcome: &str) {
    metrics::counter!("medspa_sms_sends_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_hosted_update(status: &str) {
    metrics::counter!("medspa_hosted_orders_updated_total", "status" => status.to_string())
        .increment(1);
}
