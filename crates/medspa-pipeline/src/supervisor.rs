// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compliance review of drafted replies.
//!
//! [`LlmSupervisor`] asks a model for a verdict on one draft.
//! [`SupervisorGate`] applies that verdict according to the configured mode,
//! bounds it by a latency budget, and audits every outcome:
//!
//! | mode    | allow    | edit        | block    | error / timeout |
//! |---------|----------|-------------|----------|-----------------|
//! | `warn`  | original | original    | original | original        |
//! | `block` | original | edited text | fallback | fallback        |
//! | `edit`  | original | edited text | fallback | original        |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use medspa_config::model::SupervisorMode;
use medspa_core::types::{
    AuditEntry, LlmRequest, ReviewRequest, SupervisorAction, SupervisorDecision,
};
use medspa_core::{AuditLog, LlmClient, MedspaError, Supervisor};

use crate::metrics;

/// Sent in place of a draft the gate withholds.
pub const SUPERVISOR_FALLBACK_REPLY: &str =
    "Thanks for your message! A team member will follow up shortly.";

pub const DEFAULT_SUPERVISOR_PROMPT: &str = "You review draft text messages written by a medical spa's AI receptionist before they are sent to a patient. \
Block drafts that give medical advice, diagnose conditions, promise treatment outcomes, quote prices or discounts the clinic has not published, or reveal information about another patient. \
Edit drafts that are acceptable in substance but need safer wording, and put the full corrected message in edited_text. Otherwise allow. \
Respond with only a JSON object: {\"action\": \"allow\" | \"edit\" | \"block\", \"edited_text\": string or null, \"reason\": string}.";

/// Reviews drafts with a single LLM completion.
pub struct LlmSupervisor {
    llm: Arc<dyn LlmClient>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl LlmSupervisor {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            system_prompt: DEFAULT_SUPERVISOR_PROMPT.to_string(),
            max_tokens: 256,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

pub(crate) fn review_prompt(user_message: &str, draft: &str) -> String {
    format!("User message:\n{user_message}\n\nAssistant draft:\n{draft}\n")
}

#[async_trait]
impl Supervisor for LlmSupervisor {
    async fn review(&self, request: &ReviewRequest) -> Result<SupervisorDecision, MedspaError> {
        let raw = self
            .llm
            .complete(&LlmRequest {
                model: self.model.clone(),
                system: self.system_prompt.clone(),
                prompt: review_prompt(&request.user_message, &request.draft),
                max_tokens: self.max_tokens,
            })
            .await?;
        parse_decision(&raw)
    }
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    edited_text: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Extracts the verdict object from a model response.
///
/// Tolerates markdown code fences and prose around the JSON object.
pub fn parse_decision(raw: &str) -> Result<SupervisorDecision, MedspaError> {
    let invalid = |detail: String| MedspaError::Provider {
        message: format!("unparseable supervisor response: {detail}"),
        source: None,
    };

    let start = raw.find('{').ok_or_else(|| invalid("no JSON object".into()))?;
    let end = raw.rfind('}').ok_or_else(|| invalid("no JSON object".into()))?;
    if end < start {
        return Err(invalid("no JSON object".into()));
    }
    let parsed: RawDecision =
        serde_json::from_str(&raw[start..=end]).map_err(|e| invalid(e.to_string()))?;
    let action: SupervisorAction = parsed
        .action
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| invalid(format!("unknown action `{}`", parsed.action)))?;

    Ok(SupervisorDecision {
        action,
        edited_text: parsed
            .edited_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        reason: parsed.reason.filter(|r| !r.trim().is_empty()),
    })
}

/// What the worker should send after review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
    pub text: String,
    /// The draft was withheld; downstream side effects tied to it are skipped.
    pub blocked: bool,
    pub outcome: &'static str,
}

/// Applies supervisor verdicts according to mode.
pub struct SupervisorGate {
    supervisor: Arc<dyn Supervisor>,
    mode: SupervisorMode,
    max_latency: Duration,
    audit: Option<Arc<dyn AuditLog>>,
}

impl SupervisorGate {
    pub fn new(supervisor: Arc<dyn Supervisor>, mode: SupervisorMode, max_latency: Duration) -> Self {
        Self {
            supervisor,
            mode,
            max_latency,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn mode(&self) -> SupervisorMode {
        self.mode
    }

    pub async fn review(&self, request: &ReviewRequest) -> GateResult {
        let verdict =
            match tokio::time::timeout(self.max_latency, self.supervisor.review(request)).await {
                Ok(result) => result,
                Err(_) => Err(MedspaError::Timeout {
                    duration: self.max_latency,
                }),
            };

        let result = self.apply(&request.draft, &verdict);
        let mode = mode_name(self.mode);
        metrics::record_supervisor(mode, result.outcome);
        match &verdict {
            Ok(decision) if decision.action != SupervisorAction::Allow => info!(
                conversation_id = %request.conversation_id,
                mode,
                action = %decision.action,
                outcome = result.outcome,
                reason = decision.reason.as_deref().unwrap_or(""),
                "supervisor flagged draft"
            ),
            Ok(_) => debug!(conversation_id = %request.conversation_id, "supervisor allowed draft"),
            Err(e) => warn!(
                conversation_id = %request.conversation_id,
                mode,
                outcome = result.outcome,
                error = %e,
                "supervisor review failed"
            ),
        }

        self.audit(request, &verdict, &result).await;
        result
    }

    fn apply(&self, draft: &str, verdict: &Result<SupervisorDecision, MedspaError>) -> GateResult {
        let original = |outcome| GateResult {
            text: draft.to_string(),
            blocked: false,
            outcome,
        };
        let fallback = |outcome| GateResult {
            text: SUPERVISOR_FALLBACK_REPLY.to_string(),
            blocked: true,
            outcome,
        };

        match (self.mode, verdict) {
            (SupervisorMode::Warn, Ok(d)) if d.action == SupervisorAction::Allow => {
                original("allowed")
            }
            (SupervisorMode::Warn, Ok(_)) => original("flagged"),
            (SupervisorMode::Warn, Err(_)) => original("fail_open"),

            (_, Ok(d)) if d.action == SupervisorAction::Allow => original("allowed"),
            (_, Ok(d)) if d.action == SupervisorAction::Block => fallback("blocked"),
            (_, Ok(d)) => match &d.edited_text {
                Some(edited) => GateResult {
                    text: edited.clone(),
                    blocked: false,
                    outcome: "edited",
                },
                None => original("allowed"),
            },

            (SupervisorMode::Block, Err(_)) => fallback("fail_closed"),
            (SupervisorMode::Edit, Err(_)) => original("fail_open"),
        }
    }

    async fn audit(
        &self,
        request: &ReviewRequest,
        verdict: &Result<SupervisorDecision, MedspaError>,
        result: &GateResult,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let (action, reason, error) = match verdict {
            Ok(d) => (Some(d.action.to_string()), d.reason.clone(), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        let entry = AuditEntry {
            actor: "supervisor".into(),
            event: "review".into(),
            org_id: request.org_id.clone(),
            conversation_id: request.conversation_id.clone(),
            detail: json!({
                "mode": mode_name(self.mode),
                "action": action,
                "outcome": result.outcome,
                "reason": reason,
                "error": error,
                "original": request.draft,
                "modified": (result.text != request.draft).then_some(&result.text),
            }),
        };
        if let Err(e) = audit.record(&entry).await {
            warn!(conversation_id = %request.conversation_id, error = %e, "failed to write supervisor audit entry");
        }
    }
}

fn mode_name(mode: SupervisorMode) -> &'static str {
    match mode {
        SupervisorMode::Warn => "warn",
        SupervisorMode::Block => "block",
        SupervisorMode::Edit => "edit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedSupervisor(Result<SupervisorDecision, String>);

    #[async_trait]
    impl Supervisor for FixedSupervisor {
        async fn review(&self, _: &ReviewRequest) -> Result<SupervisorDecision, MedspaError> {
            self.0.clone().map_err(MedspaError::Internal)
        }
    }

    struct SlowSupervisor;

    #[async_trait]
    impl Supervisor for SlowSupervisor {
        async fn review(&self, _: &ReviewRequest) -> Result<SupervisorDecision, MedspaError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SupervisorDecision::allow())
        }
    }

    #[derive(Default)]
    struct MemoryAudit(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditLog for MemoryAudit {
        async fn record(&self, entry: &AuditEntry) -> Result<(), MedspaError> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn request() -> ReviewRequest {
        ReviewRequest {
            org_id: "org".into(),
            conversation_id: "sms:org:15550001111".into(),
            lead_id: "lead".into(),
            user_message: "Can I get Botox while pregnant?".into(),
            draft: "Sure, that's totally safe!".into(),
        }
    }

    fn decision(action: SupervisorAction, edited: Option<&str>) -> SupervisorDecision {
        SupervisorDecision {
            action,
            edited_text: edited.map(str::to_string),
            reason: Some("medical advice".into()),
        }
    }

    fn gate(verdict: Result<SupervisorDecision, String>, mode: SupervisorMode) -> SupervisorGate {
        SupervisorGate::new(
            Arc::new(FixedSupervisor(verdict)),
            mode,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn warn_mode_always_sends_original() {
        for verdict in [
            Ok(decision(SupervisorAction::Block, None)),
            Ok(decision(SupervisorAction::Edit, Some("safer"))),
            Err("boom".to_string()),
        ] {
            let result = gate(verdict, SupervisorMode::Warn).review(&request()).await;
            assert_eq!(result.text, "Sure, that's totally safe!");
            assert!(!result.blocked);
        }
    }

    #[tokio::test]
    async fn block_mode_withholds_flagged_draft() {
        let result = gate(Ok(decision(SupervisorAction::Block, None)), SupervisorMode::Block)
            .review(&request())
            .await;
        assert_eq!(result.text, SUPERVISOR_FALLBACK_REPLY);
        assert!(result.blocked);
        assert_eq!(result.outcome, "blocked");
    }

    #[tokio::test]
    async fn block_mode_fails_closed_on_error() {
        let result = gate(Err("transport".into()), SupervisorMode::Block)
            .review(&request())
            .await;
        assert_eq!(result.text, SUPERVISOR_FALLBACK_REPLY);
        assert_eq!(result.outcome, "fail_closed");
    }

    #[tokio::test(start_paused = true)]
    async fn block_mode_fails_closed_on_timeout() {
        let gate = SupervisorGate::new(
            Arc::new(SlowSupervisor),
            SupervisorMode::Block,
            Duration::from_millis(1500),
        );
        let result = gate.review(&request()).await;
        assert!(result.blocked);
        assert_eq!(result.outcome, "fail_closed");
    }

    #[tokio::test]
    async fn edit_modes_apply_edited_text() {
        for mode in [SupervisorMode::Block, SupervisorMode::Edit] {
            let result = gate(
                Ok(decision(SupervisorAction::Edit, Some("Please ask your provider."))),
                mode,
            )
            .review(&request())
            .await;
            assert_eq!(result.text, "Please ask your provider.");
            assert_eq!(result.outcome, "edited");
        }
    }

    #[tokio::test]
    async fn edit_mode_fails_open() {
        let result = gate(Err("transport".into()), SupervisorMode::Edit)
            .review(&request())
            .await;
        assert_eq!(result.text, "Sure, that's totally safe!");
        assert!(!result.blocked);
    }

    #[tokio::test]
    async fn every_outcome_is_audited() {
        let audit = Arc::new(MemoryAudit::default());
        let gate = gate(Ok(decision(SupervisorAction::Block, None)), SupervisorMode::Block)
            .with_audit(audit.clone());
        gate.review(&request()).await;

        let entries = audit.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "supervisor");
        assert_eq!(entries[0].event, "review");
        assert_eq!(entries[0].detail["action"], "block");
        assert_eq!(entries[0].detail["original"], "Sure, that's totally safe!");
        assert_eq!(entries[0].detail["modified"], SUPERVISOR_FALLBACK_REPLY);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = "Here is my verdict:\n```json\n{\"action\": \"Edit\", \"edited_text\": \" Call us. \", \"reason\": \"tone\"}\n```";
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action, SupervisorAction::Edit);
        assert_eq!(d.edited_text.as_deref(), Some("Call us."));
        assert_eq!(d.reason.as_deref(), Some("tone"));
    }

    #[test]
    fn rejects_unknown_action_and_missing_object() {
        assert!(parse_decision("{\"action\": \"maybe\"}").is_err());
        assert!(parse_decision("looks fine to me").is_err());
    }

    #[test]
    fn prompt_layout() {
        assert_eq!(
            review_prompt("hi", "hello!"),
            "User message:\nhi\n\nAssistant draft:\nhello!\n"
        );
    }

    struct CapturingLlm(Mutex<Option<LlmRequest>>);

    #[async_trait]
    impl LlmClient for CapturingLlm {
        async fn complete(&self, request: &LlmRequest) -> Result<String, MedspaError> {
            *self.0.lock().unwrap() = Some(request.clone());
            Ok("{\"action\":\"allow\",\"reason\":\"ok\"}".into())
        }
    }

    #[tokio::test]
    async fn llm_supervisor_sends_model_and_prompt() {
        let llm = Arc::new(CapturingLlm(Mutex::new(None)));
        let sup = LlmSupervisor::new(llm.clone(), "claude-haiku-4-5").with_max_tokens(128);
        let d = sup.review(&request()).await.unwrap();
        assert_eq!(d.action, SupervisorAction::Allow);

        let sent = llm.0.lock().unwrap().clone().unwrap();
        assert_eq!(sent.model, "claude-haiku-4-5");
        assert_eq!(sent.max_tokens, 128);
        assert!(sent.prompt.starts_with("User message:\nCan I get Botox"));
        assert_eq!(sent.system, DEFAULT_SUPERVISOR_PROMPT);
    }
}
