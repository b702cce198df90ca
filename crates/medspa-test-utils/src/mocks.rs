// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording doubles for the remaining pipeline collaborators.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use medspa_core::types::{
    CheckoutLink, CheckoutProviderKind, CheckoutRequest, HostedOrderStatus, LlmRequest,
    Notification, QueueMessage, ReviewRequest, SmsRequest, SmsSendResult, SupervisorDecision,
};
use medspa_core::{
    BookingAdapter, CheckoutProvider, HostedOrderClient, LlmClient, MedspaError, Notifier, Queue,
    SandboxPurger, SmsSender, Supervisor, UrlShortener,
};

/// Captures operator notifications.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), MedspaError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Captures booking confirmations as `(org_id, lead_id, scheduled_for)`.
#[derive(Clone, Default)]
pub struct MockBooking {
    confirmed: Arc<Mutex<Vec<(String, String, DateTime<Utc>)>>>,
    failing: Arc<AtomicBool>,
}

impl MockBooking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn confirmed(&self) -> Vec<(String, String, DateTime<Utc>)> {
        self.confirmed.lock().await.clone()
    }
}

#[async_trait]
impl BookingAdapter for MockBooking {
    async fn confirm_booking(
        &self,
        org_id: &str,
        lead_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), MedspaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MedspaError::provider("slot no longer available"));
        }
        self.confirmed
            .lock()
            .await
            .push((org_id.to_string(), lead_id.to_string(), scheduled_for));
        Ok(())
    }
}

/// Captures sandbox purge requests as `(org_id, conversation_id, phone)`.
#[derive(Clone, Default)]
pub struct MockPurger {
    scheduled: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockPurger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn scheduled(&self) -> Vec<(String, String, String)> {
        self.scheduled.lock().await.clone()
    }
}

#[async_trait]
impl SandboxPurger for MockPurger {
    async fn schedule_purge(
        &self,
        org_id: &str,
        conversation_id: &str,
        phone: &str,
    ) -> Result<(), MedspaError> {
        self.scheduled.lock().await.push((
            org_id.to_string(),
            conversation_id.to_string(),
            phone.to_string(),
        ));
        Ok(())
    }
}

/// How [`MockSupervisor`] answers.
#[derive(Debug, Clone)]
pub enum SupervisorBehavior {
    Decide(SupervisorDecision),
    Fail(String),
    /// Sleep before deciding; pair with a short gate latency to force a timeout.
    Slow(Duration, SupervisorDecision),
}

#[derive(Clone)]
pub struct MockSupervisor {
    behavior: SupervisorBehavior,
    reviewed: Arc<Mutex<Vec<ReviewRequest>>>,
}

impl MockSupervisor {
    pub fn new(behavior: SupervisorBehavior) -> Self {
        Self {
            behavior,
            reviewed: Arc::default(),
        }
    }

    pub fn deciding(decision: SupervisorDecision) -> Self {
        Self::new(SupervisorBehavior::Decide(decision))
    }

    pub async fn reviewed(&self) -> Vec<ReviewRequest> {
        self.reviewed.lock().await.clone()
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    async fn review(&self, request: &ReviewRequest) -> Result<SupervisorDecision, MedspaError> {
        self.reviewed.lock().await.push(request.clone());
        match &self.behavior {
            SupervisorBehavior::Decide(decision) => Ok(decision.clone()),
            SupervisorBehavior::Fail(message) => Err(MedspaError::provider(message.clone())),
            SupervisorBehavior::Slow(delay, decision) => {
                tokio::time::sleep(*delay).await;
                Ok(decision.clone())
            }
        }
    }
}

/// Checkout provider that mints deterministic links and records requests.
#[derive(Clone)]
pub struct MockCheckout {
    kind: CheckoutProviderKind,
    requests: Arc<Mutex<Vec<CheckoutRequest>>>,
    failing: Arc<AtomicBool>,
}

impl MockCheckout {
    pub fn new(kind: CheckoutProviderKind) -> Self {
        Self {
            kind,
            requests: Arc::default(),
            failing: Arc::default(),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CheckoutProvider for MockCheckout {
    fn kind(&self) -> CheckoutProviderKind {
        self.kind
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutLink, MedspaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MedspaError::provider("checkout declined"));
        }
        self.requests.lock().await.push(request.clone());
        Ok(CheckoutLink {
            url: format!("https://checkout.test/{}", request.booking_intent_id),
            provider_ref: Some(format!("{}_{}", self.kind, request.booking_intent_id.simple())),
        })
    }
}

/// Shortener that maps every URL to `https://short.test/{n}`.
#[derive(Clone, Default)]
pub struct MockShortener {
    next: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

impl MockShortener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl UrlShortener for MockShortener {
    async fn shorten(&self, _url: &str) -> Result<String, MedspaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MedspaError::provider("shortener unavailable"));
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://short.test/{n}"))
    }
}

/// LLM client returning queued completions, `{"action":"allow"}` when empty.
#[derive(Clone, Default)]
pub struct MockLlm {
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl MockLlm {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::default(),
        }
    }

    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<String, MedspaError> {
        self.requests.lock().await.push(request.clone());
        Ok(self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| r#"{"action":"allow"}"#.to_string()))
    }
}

/// Queue whose backend is down: every call fails.
#[derive(Clone, Copy, Default)]
pub struct FailingQueue;

#[async_trait]
impl Queue for FailingQueue {
    fn name(&self) -> &str {
        "failing"
    }

    async fn enqueue(&self, _body: String) -> Result<(), MedspaError> {
        Err(MedspaError::queue("simulated queue outage", None))
    }

    async fn receive(
        &self,
        _max: usize,
        _wait: Duration,
    ) -> Result<Vec<QueueMessage>, MedspaError> {
        Err(MedspaError::queue("simulated queue outage", None))
    }

    async fn ack(&self, _message: &QueueMessage) -> Result<(), MedspaError> {
        Err(MedspaError::queue("simulated queue outage", None))
    }
}

/// SMS sender with a scripted sequence of outcomes. Unscripted sends succeed
/// with status `queued`.
#[derive(Clone, Default)]
pub struct MockSmsSender {
    script: Arc<Mutex<VecDeque<Result<SmsSendResult, String>>>>,
    sent: Arc<Mutex<Vec<SmsRequest>>>,
    next_id: Arc<AtomicU64>,
}

impl MockSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_failure(&self, message: &str) {
        self.script.lock().await.push_back(Err(message.to_string()));
    }

    pub async fn push_result(&self, result: SmsSendResult) {
        self.script.lock().await.push_back(Ok(result));
    }

    /// Every request handed to the sender, including failed ones.
    pub async fn requests(&self) -> Vec<SmsRequest> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl SmsSender for MockSmsSender {
    async fn send_sms(&self, request: &SmsRequest) -> Result<SmsSendResult, MedspaError> {
        self.sent.lock().await.push(request.clone());
        match self.script.lock().await.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(MedspaError::messaging(message)),
            None => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(SmsSendResult {
                    provider_message_id: format!("mock-sms-{n}"),
                    status: Some("queued".to_string()),
                })
            }
        }
    }
}

/// Hosted-order client answering from a fixed map of order id to status.
#[derive(Clone, Default)]
pub struct MockHostedOrderClient {
    statuses: Arc<Mutex<Vec<(String, Result<HostedOrderStatus, String>)>>>,
}

impl MockHostedOrderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_status(&self, provider_order_id: &str, status: &str) {
        self.set(
            provider_order_id,
            Ok(HostedOrderStatus {
                status: status.to_string(),
                last_error: None,
            }),
        )
        .await;
    }

    pub async fn set_error(&self, provider_order_id: &str, message: &str) {
        self.set(provider_order_id, Err(message.to_string())).await;
    }

    async fn set(&self, provider_order_id: &str, value: Result<HostedOrderStatus, String>) {
        let mut statuses = self.statuses.lock().await;
        statuses.retain(|(id, _)| id != provider_order_id);
        statuses.push((provider_order_id.to_string(), value));
    }
}

#[async_trait]
impl HostedOrderClient for MockHostedOrderClient {
    async fn get_hosted_order(
        &self,
        provider_order_id: &str,
    ) -> Result<HostedOrderStatus, MedspaError> {
        let statuses = self.statuses.lock().await;
        match statuses.iter().find(|(id, _)| id == provider_order_id) {
            Some((_, Ok(status))) => Ok(status.clone()),
            Some((_, Err(message))) => Err(MedspaError::messaging(message.clone())),
            None => Err(MedspaError::messaging(format!(
                "unknown hosted order {provider_order_id}"
            ))),
        }
    }
}
