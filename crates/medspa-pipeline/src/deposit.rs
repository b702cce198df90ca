// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deposit dispatch: issue a checkout link once a lead is qualified.
//!
//! The link is never sent inline. The payment intent and the reply carrying
//! the link are committed together through the outbox, so delivery inherits
//! the outbox's retry guarantees.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use medspa_core::events::{
    DEPOSIT_REQUESTED_V1, DepositRequestedV1, OutboxEvent, REPLY_REQUESTED_V1, ReplyRequestedV1,
};
use medspa_core::types::{
    CheckoutLink, CheckoutProviderKind, CheckoutRequest, ClinicConfig, DepositLead,
    DepositRecord, PaymentIntent, TranscriptEntry, TranscriptRole,
};
use medspa_core::{
    CheckoutProvider, ClinicConfigStore, MedspaError, PaymentLedger, PaymentStatusChecker,
    TranscriptRecorder, UrlShortener,
};

use crate::metrics;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Requested {
        booking_intent_id: String,
        checkout_url: String,
        provider: CheckoutProviderKind,
    },
    /// The lead already has a pending or paid deposit.
    AlreadyOpen,
    /// Nothing was sent; the reason is logged.
    Skipped { reason: String },
}

impl DepositOutcome {
    pub fn is_requested(&self) -> bool {
        matches!(self, DepositOutcome::Requested { .. })
    }
}

pub fn deposit_message(amount_cents: i64, url: &str) -> String {
    format!(
        "To secure priority booking, please place a refundable ${:.2} deposit: {url}\n\n\
         Note: This reserves your priority spot, not a confirmed time. Our team will call to finalize your exact appointment.",
        amount_cents as f64 / 100.0
    )
}

pub struct DepositDispatcher {
    providers: HashMap<CheckoutProviderKind, Arc<dyn CheckoutProvider>>,
    status: Arc<dyn PaymentStatusChecker>,
    ledger: Arc<dyn PaymentLedger>,
    clinics: Option<Arc<dyn ClinicConfigStore>>,
    shortener: Option<Arc<dyn UrlShortener>>,
    transcript: Option<Arc<dyn TranscriptRecorder>>,
    default_provider: CheckoutProviderKind,
    default_amount_cents: i64,
}

impl DepositDispatcher {
    pub fn new(status: Arc<dyn PaymentStatusChecker>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self {
            providers: HashMap::new(),
            status,
            ledger,
            clinics: None,
            shortener: None,
            transcript: None,
            default_provider: CheckoutProviderKind::default(),
            default_amount_cents: 5000,
        }
    }

    /// Registers a checkout provider under its own kind.
    pub fn with_provider(mut self, provider: Arc<dyn CheckoutProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn with_clinics(mut self, clinics: Arc<dyn ClinicConfigStore>) -> Self {
        self.clinics = Some(clinics);
        self
    }

    pub fn with_shortener(mut self, shortener: Arc<dyn UrlShortener>) -> Self {
        self.shortener = Some(shortener);
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<dyn TranscriptRecorder>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Provider and amount used when the clinic has no configuration.
    pub fn with_defaults(mut self, provider: CheckoutProviderKind, amount_cents: i64) -> Self {
        self.default_provider = provider;
        self.default_amount_cents = amount_cents;
        self
    }

    /// Issues a checkout link for `lead` unless one is already open.
    ///
    /// `amount_cents` overrides the clinic's configured deposit.
    pub async fn dispatch(
        &self,
        lead: &DepositLead,
        amount_cents: Option<i64>,
    ) -> Result<DepositOutcome, MedspaError> {
        let org_uuid = parse_uuid("org_id", &lead.org_id)?;
        let lead_uuid = parse_uuid("lead_id", &lead.lead_id)?;

        match self.status.has_open_deposit(&org_uuid, &lead_uuid).await {
            Ok(true) => {
                debug!(lead_id = %lead.lead_id, "deposit already open, not issuing another link");
                return Ok(DepositOutcome::AlreadyOpen);
            }
            Ok(false) => {}
            Err(e) => {
                // Unknown payment state: sending could double-charge.
                warn!(lead_id = %lead.lead_id, error = %e, "payment status check failed, skipping deposit");
                return Ok(DepositOutcome::Skipped {
                    reason: format!("payment status unavailable: {e}"),
                });
            }
        }

        let clinic = self.clinic(&lead.org_id).await;
        let kind = clinic
            .as_ref()
            .map(|c| c.payment_provider)
            .unwrap_or(self.default_provider);
        let provider = self.providers.get(&kind).ok_or_else(|| MedspaError::Provider {
            message: format!("no checkout provider registered for `{kind}`"),
            source: None,
        })?;
        let amount = amount_cents
            .filter(|a| *a > 0)
            .or_else(|| clinic.as_ref().map(|c| c.deposit_amount_cents).filter(|a| *a > 0))
            .unwrap_or(self.default_amount_cents);

        let booking_intent_id = Uuid::new_v4();
        let description = match lead.service.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => format!("Deposit for {s}"),
            _ => "Priority booking deposit".to_string(),
        };
        let link = provider
            .create_checkout(&CheckoutRequest {
                org_id: org_uuid,
                lead_id: lead_uuid,
                booking_intent_id,
                amount_cents: amount,
                description,
            })
            .await?;
        let url = self.shorten(&link).await;
        let body = deposit_message(amount, &url);

        let now = Utc::now();
        let intent = PaymentIntent {
            id: Uuid::new_v4().to_string(),
            org_id: lead.org_id.clone(),
            lead_id: lead.lead_id.clone(),
            provider: kind,
            provider_ref: link.provider_ref.clone(),
            booking_intent_id: booking_intent_id.to_string(),
            amount_cents: amount,
            status: "deposit_pending".into(),
            created_at: now,
        };
        let reply = ReplyRequestedV1 {
            event_id: Uuid::new_v4().to_string(),
            org_id: lead.org_id.clone(),
            lead_id: Some(lead.lead_id.clone()),
            conversation_id: lead.conversation_id.clone(),
            channel: lead.channel,
            to: lead.to.clone(),
            from: lead.from.clone(),
            body: body.clone(),
            requested_at: now,
        };
        let mut reply_event = OutboxEvent::new(REPLY_REQUESTED_V1, &reply)?;
        reply_event.id = reply.event_id.clone();
        let deposit_event = OutboxEvent::new(
            DEPOSIT_REQUESTED_V1,
            &DepositRequestedV1 {
                event_id: Uuid::new_v4().to_string(),
                org_id: lead.org_id.clone(),
                lead_id: lead.lead_id.clone(),
                booking_intent_id: intent.booking_intent_id.clone(),
                provider: kind,
                amount_cents: amount,
                checkout_url: link.url.clone(),
                requested_at: now,
            },
        )?;

        let record = self
            .ledger
            .record_deposit_request(&intent, &[reply_event, deposit_event])
            .await?;
        if record == DepositRecord::AlreadyOpen {
            // Lost the race to a concurrent dispatch; its link is the one sent.
            info!(
                lead_id = %lead.lead_id,
                booking_intent_id = %intent.booking_intent_id,
                "deposit opened concurrently, discarding checkout"
            );
            return Ok(DepositOutcome::AlreadyOpen);
        }
        metrics::record_deposit(&kind.to_string());
        info!(
            lead_id = %lead.lead_id,
            booking_intent_id = %intent.booking_intent_id,
            provider = %kind,
            amount_cents = amount,
            "deposit requested"
        );

        if let Some(transcript) = &self.transcript {
            let entry = TranscriptEntry {
                org_id: lead.org_id.clone(),
                conversation_id: lead.conversation_id.clone(),
                role: TranscriptRole::Assistant,
                body,
            };
            if let Err(e) = transcript.record(&entry).await {
                warn!(conversation_id = %lead.conversation_id, error = %e, "failed to record deposit message");
            }
        }

        Ok(DepositOutcome::Requested {
            booking_intent_id: intent.booking_intent_id,
            checkout_url: url,
            provider: kind,
        })
    }

    async fn clinic(&self, org_id: &str) -> Option<ClinicConfig> {
        let clinics = self.clinics.as_ref()?;
        match clinics.clinic(org_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(org_id, error = %e, "clinic config lookup failed, using deposit defaults");
                None
            }
        }
    }

    async fn shorten(&self, link: &CheckoutLink) -> String {
        let Some(shortener) = &self.shortener else {
            return link.url.clone();
        };
        match shortener.shorten(&link.url).await {
            Ok(short) if !short.trim().is_empty() => short,
            Ok(_) => link.url.clone(),
            Err(e) => {
                warn!(error = %e, "url shortener failed, sending full checkout link");
                link.url.clone()
            }
        }
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, MedspaError> {
    Uuid::parse_str(value.trim())
        .map_err(|e| MedspaError::Validation(format!("{field} `{value}` is not a uuid: {e}")))
}

/// Demo checkout provider that mints local links without calling a payment API.
pub struct FakeCheckoutProvider {
    base_url: String,
}

impl FakeCheckoutProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for FakeCheckoutProvider {
    fn default() -> Self {
        Self::new("https://pay.medspa.test")
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckoutProvider {
    fn kind(&self) -> CheckoutProviderKind {
        CheckoutProviderKind::Fake
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutLink, MedspaError> {
        Ok(CheckoutLink {
            url: format!(
                "{}/checkout/{}?amount_cents={}",
                self.base_url, request.booking_intent_id, request.amount_cents
            ),
            provider_ref: Some(format!("fake_{}", request.booking_intent_id.simple())),
        })
    }
}
