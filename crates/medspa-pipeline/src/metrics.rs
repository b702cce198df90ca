// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so whichever recorder the binary installs
//! (Prometheus or none) collects these.

use metrics::{describe_counter, describe_histogram};

/// Register pipeline metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("medspa_jobs_enqueued_total", "Jobs accepted by the queue");
    describe_counter!(
        "medspa_queue_rejections_total",
        "Enqueue attempts rejected by the queue"
    );
    describe_counter!(
        "medspa_jobs_processed_total",
        "Jobs finished by workers, by outcome"
    );
    describe_histogram!(
        "medspa_job_duration_seconds",
        "Wall time spent processing one job"
    );
    describe_counter!(
        "medspa_supervisor_decisions_total",
        "Supervisor review outcomes, by mode and outcome"
    );
    describe_counter!(
        "medspa_outbox_dispatched_total",
        "Outbox events routed and marked dispatched"
    );
    describe_counter!(
        "medspa_outbox_failures_total",
        "Outbox events left undispatched after a routing failure"
    );
    describe_counter!("medspa_deposits_requested_total", "Checkout links issued");
    describe_counter!(
        "medspa_output_guard_hits_total",
        "Generated replies caught by the output guard, by reason"
    );
}

pub fn record_enqueued(kind: &str) {
    metrics::counter!("medspa_jobs_enqueued_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_queue_rejection(queue: &str) {
    metrics::counter!("medspa_queue_rejections_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_job(outcome: &str, seconds: f64) {
    metrics::counter!("medspa_jobs_processed_total", "outcome" => outcome.to_string())
        .increment(1);
    metrics::histogram!("medspa_job_duration_seconds").record(seconds);
}

pub fn record_supervisor(mode: &str, outcome: &str) {
    metrics::counter!(
        "medspa_supervisor_decisions_total",
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_outbox_dispatched(event_type: &str) {
    metrics::counter!("medspa_outbox_dispatched_total", "event_type" => event_type.to_string())
        .increment(1);
}

pub fn record_outbox_failure(event_type: &str) {
    metrics::counter!("medspa_outbox_failures_total", "event_type" => event_type.to_string())
        .increment(1);
}

pub fn record_deposit(provider: &str) {
    metrics::counter!("medspa_deposits_requested_total", "provider" => provider.to_string())
        .increment(1);
}

pub fn record_output_guard(reason: &str) {
    metrics::counter!("medspa_output_guard_hits_total", "reason" => reason.to_string())
        .increment(1);
}
