// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in conversation service used when no qualification engine is
//! deployed alongside the pipeline.
//!
//! It greets new conversations, honours opt-out keywords, and otherwise
//! promises a human follow-up. It never requests deposits or offers times.

use async_trait::async_trait;
use tracing::debug;

use medspa_core::types::{ConversationRequest, ServiceReply};
use medspa_core::{ConversationService, MedspaError};

pub const GREETING: &str =
    "Hi! Thanks for reaching out. What treatment are you interested in, and when works best for you?";
pub const FOLLOW_UP: &str = "Thanks for your message! A team member will follow up shortly.";
pub const OPT_OUT_CONFIRMATION: &str =
    "You're unsubscribed and won't receive more messages. Reply START to resubscribe.";

const OPT_OUT_KEYWORDS: &[&str] = &["STOP", "STOPALL", "UNSUBSCRIBE", "CANCEL", "END", "QUIT"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgementService;

fn is_opt_out(message: &str) -> bool {
    let word = message.trim().trim_end_matches(['.', '!']);
    OPT_OUT_KEYWORDS
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

#[async_trait]
impl ConversationService for AcknowledgementService {
    async fn start(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError> {
        debug!(conversation_id = %request.conversation_id, "greeting new conversation");
        Ok(ServiceReply {
            message: GREETING.to_string(),
            ..ServiceReply::default()
        })
    }

    async fn process(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError> {
        if is_opt_out(&request.message) {
            return Ok(ServiceReply {
                message: OPT_OUT_CONFIRMATION.to_string(),
                opted_out: true,
                ..ServiceReply::default()
            });
        }
        Ok(ServiceReply {
            message: FOLLOW_UP.to_string(),
            ..ServiceReply::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(message: &str) -> ConversationRequest {
        ConversationRequest {
            org_id: "org".into(),
            lead_id: "lead".into(),
            conversation_id: "sms:org:15550001111".into(),
            from: "+15550001111".into(),
            to: "+15559990000".into(),
            message: message.into(),
            provider_message_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn opt_out_keywords_are_case_insensitive() {
        assert!(is_opt_out("stop"));
        assert!(is_opt_out("  Unsubscribe. "));
        assert!(!is_opt_out("please don't stop texting me"));
        assert!(!is_opt_out("STOPPED"));
    }

    #[tokio::test]
    async fn stop_opts_out() {
        let reply = AcknowledgementService.process(&request("STOP")).await.unwrap();
        assert!(reply.opted_out);
        assert_eq!(reply.message, OPT_OUT_CONFIRMATION);
    }

    #[tokio::test]
    async fn other_messages_get_a_follow_up() {
        let reply = AcknowledgementService
            .process(&request("Do you do lip filler?"))
            .await
            .unwrap();
        assert!(!reply.opted_out);
        assert!(reply.deposit_intent.is_none());
        assert_eq!(reply.message, FOLLOW_UP);

        let greeting = AcknowledgementService.start(&request("")).await.unwrap();
        assert_eq!(greeting.message, GREETING);
    }
}
