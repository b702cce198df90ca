// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment webhooks recorded through the outbox and re-injected as jobs.

use chrono::{TimeZone, Utc};
use serde_json::json;

use medspa_core::events::{
    DEPOSIT_REQUESTED_V1, OutboxEvent, PAYMENT_SUCCEEDED_V1, PaymentFailedV1, PaymentSucceededV1,
};
use medspa_core::types::{CheckoutProviderKind, Notification};
use medspa_core::{ConversationStatus, ConversationStore};
use medspa_pipeline::payment::{CANCELLATION_POLICY_REMINDER, PAYMENT_FAILED_TEXT};
use medspa_pipeline::{IntakeOutcome, JobOutcome};
use medspa_test_utils::TestHarness;
use medspa_test_utils::harness::{TEST_CLINIC_PHONE, TEST_LEAD_ID, TEST_ORG_ID, TEST_PATIENT_PHONE};

fn succeeded(event_id: &str) -> PaymentSucceededV1 {
    PaymentSucceededV1 {
        event_id: event_id.into(),
        org_id: TEST_ORG_ID.into(),
        lead_id: TEST_LEAD_ID.into(),
        booking_intent_id: None,
        provider: CheckoutProviderKind::Square,
        provider_ref: Some(format!("sq_{event_id}")),
        amount_cents: 5000,
        lead_phone: TEST_PATIENT_PHONE.into(),
        from_number: TEST_CLINIC_PHONE.into(),
        service_name: Some("Botox".into()),
        scheduled_for: Some(Utc.with_ymd_and_hms(2026, 3, 3, 22, 30, 0).unwrap()),
        occurred_at: Utc::now(),
    }
}

fn failed(event_id: &str) -> PaymentFailedV1 {
    PaymentFailedV1 {
        event_id: event_id.into(),
        org_id: TEST_ORG_ID.into(),
        lead_id: TEST_LEAD_ID.into(),
        booking_intent_id: None,
        provider: CheckoutProviderKind::Stripe,
        provider_ref: None,
        lead_phone: TEST_PATIENT_PHONE.into(),
        from_number: TEST_CLINIC_PHONE.into(),
        failure_reason: Some("card_declined".into()),
        occurred_at: Utc::now(),
    }
}

#[tokio::test]
async fn payment_succeeded_is_delivered_exactly_once() {
    let harness = TestHarness::builder().build().await.unwrap();
    let event = succeeded("evt-100");

    assert_eq!(
        harness.payment_intake.record_payment_succeeded(&event).await.unwrap(),
        IntakeOutcome::Recorded
    );
    assert_eq!(
        harness.payment_intake.record_payment_succeeded(&event).await.unwrap(),
        IntakeOutcome::Duplicate
    );
    assert_eq!(
        harness.store.outbox_events_of_type(PAYMENT_SUCCEEDED_V1).await.unwrap().len(),
        1
    );

    assert_eq!(harness.deliver_outbox().await.unwrap(), 1);
    assert_eq!(harness.run_queued().await.unwrap(), vec![JobOutcome::Completed]);

    let expected = format!(
        "Payment received! Your Botox appointment at Glow Med Spa on Tuesday, March 3 at 2:30 PM PST is confirmed. {CANCELLATION_POLICY_REMINDER}"
    );
    let sent = harness.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, expected);
    assert_eq!(sent[0].to, TEST_PATIENT_PHONE);
    assert_eq!(sent[0].from, TEST_CLINIC_PHONE);
    assert_eq!(sent[0].metadata.get("event_id").map(String::as_str), Some("evt-100"));

    assert_eq!(harness.booking.confirmed().await.len(), 1);
    assert!(matches!(
        harness.notifier.notifications().await.as_slice(),
        [Notification::PaymentReceived { amount_cents: 5000, .. }]
    ));
    assert_eq!(
        harness
            .store
            .status(TEST_ORG_ID, &TestHarness::conversation_id())
            .await
            .unwrap(),
        Some(ConversationStatus::Completed)
    );

    let events = harness.store.outbox_events_of_type(PAYMENT_SUCCEEDED_V1).await.unwrap();
    assert!(events[0].dispatched);
    assert!(events[0].dispatched_at.is_some());
    assert_eq!(harness.deliver_outbox().await.unwrap(), 0);
}

#[tokio::test]
async fn replayed_payment_job_does_not_resend() {
    let harness = TestHarness::builder().build().await.unwrap();
    let event = succeeded("evt-200");
    harness.payment_intake.record_payment_succeeded(&event).await.unwrap();
    harness.deliver_outbox().await.unwrap();
    harness.run_queued().await.unwrap();

    // The same fact arriving under a different outbox id still maps to the
    // same provider reference.
    harness
        .store
        .append_outbox(&OutboxEvent::new(PAYMENT_SUCCEEDED_V1, &event).unwrap())
        .await
        .unwrap();
    assert_eq!(harness.deliver_outbox().await.unwrap(), 1);
    assert_eq!(harness.run_queued().await.unwrap(), vec![JobOutcome::Completed]);

    assert_eq!(harness.messenger.sent_count().await, 1);
    assert_eq!(harness.booking.confirmed().await.len(), 1);
}

#[tokio::test]
async fn unscheduled_payment_promises_a_callback() {
    let harness = TestHarness::builder().build().await.unwrap();
    let mut event = succeeded("evt-300");
    event.scheduled_for = None;
    harness.payment_intake.record_payment_succeeded(&event).await.unwrap();
    harness.deliver_outbox().await.unwrap();
    harness.run_queued().await.unwrap();

    assert_eq!(
        harness.messenger.bodies().await,
        vec![
            "Payment of $50.00 received - thank you! A Glow Med Spa team member will call you within 24 hours to confirm your appointment."
        ]
    );
    assert!(harness.booking.confirmed().await.is_empty());
}

#[tokio::test]
async fn payment_failed_sends_retry_guidance() {
    let harness = TestHarness::builder().build().await.unwrap();
    assert_eq!(
        harness.payment_intake.record_payment_failed(&failed("evt-400")).await.unwrap(),
        IntakeOutcome::Recorded
    );
    assert_eq!(harness.deliver_outbox().await.unwrap(), 1);
    assert_eq!(harness.run_queued().await.unwrap(), vec![JobOutcome::Completed]);

    assert_eq!(harness.messenger.bodies().await, vec![PAYMENT_FAILED_TEXT]);
    assert!(matches!(
        harness.notifier.notifications().await.as_slice(),
        [Notification::PaymentFailed { reason: Some(r), .. }] if r == "card_declined"
    ));
}

#[tokio::test]
async fn opted_out_lead_gets_no_payment_text() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .store
        .set_status(TEST_ORG_ID, &TestHarness::conversation_id(), ConversationStatus::OptedOut)
        .await
        .unwrap();
    harness.payment_intake.record_payment_failed(&failed("evt-500")).await.unwrap();
    harness.deliver_outbox().await.unwrap();
    assert_eq!(harness.run_queued().await.unwrap(), vec![JobOutcome::Completed]);
    assert_eq!(harness.messenger.sent_count().await, 0);
}

#[tokio::test]
async fn unknown_event_type_stays_pending() {
    let harness = TestHarness::builder().build().await.unwrap();
    let event = OutboxEvent::new("analytics.page_view.v1", &json!({"path": "/"})).unwrap();
    harness.store.append_outbox(&event).await.unwrap();

    assert_eq!(harness.deliver_outbox().await.unwrap(), 0);
    let stored = harness.store.outbox_event(&event.id).await.unwrap().unwrap();
    assert!(!stored.dispatched);
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn informational_events_are_marked_without_a_job() {
    let harness = TestHarness::builder().build().await.unwrap();
    let event = OutboxEvent::new(DEPOSIT_REQUESTED_V1, &json!({"booking_intent_id": "bi-1"})).unwrap();
    harness.store.append_outbox(&event).await.unwrap();

    assert_eq!(harness.deliver_outbox().await.unwrap(), 1);
    assert!(harness.queue.is_empty());
    assert!(harness.store.outbox_event(&event.id).await.unwrap().unwrap().dispatched);
}
