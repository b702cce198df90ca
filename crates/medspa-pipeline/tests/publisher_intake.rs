// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job creation: tracking, backpressure and inbound dedupe.

use std::sync::Arc;

use medspa_core::{Channel, JobStatus, JobStore, MedspaError, ProcessedStore};
use medspa_pipeline::{IntakeOutcome, MessageIntake, PublishOptions, Publisher};
use medspa_test_utils::TestHarness;
use medspa_test_utils::mocks::FailingQueue;

#[tokio::test]
async fn tracked_job_starts_pending() {
    let harness = TestHarness::builder().build().await.unwrap();
    let job_id = Publisher::new_job_id();
    harness
        .publisher
        .enqueue_message(
            &job_id,
            Channel::Webchat,
            TestHarness::sms_request("hello", None),
            PublishOptions::default(),
        )
        .await
        .unwrap();

    let job = harness.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.channel, Channel::Webchat);
    assert_eq!(job.kind, "message");
    assert_eq!(harness.queue.len(), 1);
}

#[tokio::test]
async fn untracked_job_has_no_record() {
    let harness = TestHarness::builder().build().await.unwrap();
    let job_id = Publisher::new_job_id();
    harness
        .publisher
        .enqueue_message(
            &job_id,
            Channel::Sms,
            TestHarness::sms_request("hello", None),
            PublishOptions::untracked(),
        )
        .await
        .unwrap();

    assert!(harness.store.get(&job_id).await.unwrap().is_none());
    assert_eq!(harness.queue.len(), 1);
}

#[tokio::test]
async fn enqueue_outage_fails_the_recorded_job() {
    let harness = TestHarness::builder().build().await.unwrap();
    let publisher = Publisher::new(Arc::new(FailingQueue), harness.store.clone());
    let job_id = Publisher::new_job_id();

    let err = publisher
        .enqueue_message(
            &job_id,
            Channel::Sms,
            TestHarness::sms_request("hello", None),
            PublishOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MedspaError::Queue { .. }), "{err:?}");

    let job = harness.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().starts_with("enqueue failed"));
}

#[tokio::test]
async fn full_queue_rejects_instead_of_blocking() {
    let harness = TestHarness::builder()
        .with_queue_capacity(1)
        .build()
        .await
        .unwrap();

    harness
        .publisher
        .enqueue_message(
            &Publisher::new_job_id(),
            Channel::Sms,
            TestHarness::sms_request("one", None),
            PublishOptions::default(),
        )
        .await
        .unwrap();
    let second = Publisher::new_job_id();
    let err = harness
        .publisher
        .enqueue_message(
            &second,
            Channel::Sms,
            TestHarness::sms_request("two", None),
            PublishOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MedspaError::QueueFull { capacity: 1 }));
    let job = harness.store.get(&second).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn provider_message_is_accepted_once() {
    let harness = TestHarness::builder().build().await.unwrap();
    let request = TestHarness::sms_request("hi", Some("SM123"));

    let first = harness
        .message_intake
        .accept_message(Channel::Sms, request.clone(), PublishOptions::default())
        .await
        .unwrap();
    let IntakeOutcome::Queued { job_id } = first else {
        panic!("expected queued, got {first:?}");
    };
    let job = harness.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let second = harness
        .message_intake
        .accept_message(Channel::Sms, request, PublishOptions::default())
        .await
        .unwrap();
    assert_eq!(second, IntakeOutcome::Duplicate);
    assert_eq!(harness.queue.len(), 1);
}

#[tokio::test]
async fn messages_without_provider_id_are_never_deduped() {
    let harness = TestHarness::builder().build().await.unwrap();
    for _ in 0..2 {
        let outcome = harness
            .message_intake
            .accept_start(
                Channel::Webchat,
                TestHarness::sms_request("", None),
                PublishOptions::untracked(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, IntakeOutcome::Queued { .. }));
    }
    assert_eq!(harness.queue.len(), 2);
}

#[tokio::test]
async fn retry_after_queue_outage_is_queued() {
    let harness = TestHarness::builder().build().await.unwrap();
    let outage = MessageIntake::new(
        harness.store.clone(),
        Publisher::new(Arc::new(FailingQueue), harness.store.clone()),
    );
    let request = TestHarness::sms_request("hi", Some("SM999"));

    assert!(
        outage
            .accept_message(Channel::Sms, request.clone(), PublishOptions::default())
            .await
            .is_err()
    );
    assert!(
        !harness
            .store
            .already_processed("messaging.sms", "SM999")
            .await
            .unwrap()
    );

    let retry = harness
        .message_intake
        .accept_message(Channel::Sms, request.clone(), PublishOptions::default())
        .await
        .unwrap();
    assert!(matches!(retry, IntakeOutcome::Queued { .. }), "{retry:?}");
    assert_eq!(harness.queue.len(), 1);

    // Once a delivery is queued, later copies are duplicates again.
    assert_eq!(
        harness
            .message_intake
            .accept_message(Channel::Sms, request, PublishOptions::default())
            .await
            .unwrap(),
        IntakeOutcome::Duplicate
    );
}
