// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output guard for generated replies.
//!
//! Runs on every conversation reply after supervisor review and before the
//! messenger sees it. Two kinds of hit:
//!
//! - **Blocking**: prompt or instruction disclosure, credentials, internal
//!   hosts and paths, references to other patients. The reply is withheld.
//! - **Sanitizable**: the assistant announcing that it is an AI. The
//!   offending sentence is removed and the rest is sent.

use std::sync::LazyLock;

use regex::Regex;

struct LeakPattern {
    re: Regex,
    reason: &'static str,
    block: bool,
}

fn pattern(re: &str, reason: &'static str, block: bool) -> LeakPattern {
    LeakPattern {
        re: Regex::new(re).unwrap(),
        reason,
        block,
    }
}

static LEAK_PATTERNS: LazyLock<Vec<LeakPattern>> = LazyLock::new(|| {
    vec![
        // Prompt and instruction disclosure
        pattern(
            r"(?i)my (system\s+)?prompt\s+(is|says|tells|instructs)",
            "leak:system_prompt_disclosure",
            true,
        ),
        pattern(
            r"(?i)my instructions?\s+(are|say|tell|include|require)",
            "leak:instructions_disclosure",
            true,
        ),
        pattern(
            r"(?i)i('m| am) (programmed|instructed|told|designed|configured) to",
            "leak:programming_disclosure",
            true,
        ),
        pattern(
            r"(?i)(here are|these are|the following are)\s+(my )?(system )?(instructions|rules|guidelines|prompts)",
            "leak:rules_listing",
            true,
        ),
        // Identity
        pattern(
            r"(?i)i('m| am) (a|an) (AI|artificial intelligence|language model|LLM|GPT|Claude|chatbot|chat bot)\b",
            "leak:ai_identity",
            false,
        ),
        pattern(
            r"(?i)(powered by|built on|running on|using)\s+(Claude|GPT|OpenAI|Anthropic|Bedrock|AWS)",
            "leak:tech_stack",
            true,
        ),
        // Credentials and infrastructure
        pattern(
            r"(?i)(api[_\s]?key|secret[_\s]?key|access[_\s]?token|bearer\s+token)\s*[:=]\s*\S+",
            "leak:credential",
            true,
        ),
        pattern(
            r"(?i)(sk|pk)[-_](live|test)[-_][a-zA-Z0-9]{20,}",
            "leak:stripe_key",
            true,
        ),
        pattern(r"(?i)AKIA[A-Z0-9]{16}", "leak:aws_key", true),
        pattern(
            r"(?i)(postgres|mysql|redis|mongodb)://\S+",
            "leak:database_url",
            true,
        ),
        pattern(
            r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{2,5}",
            "leak:ip_port",
            true,
        ),
        pattern(
            r"(?i)(api-dev|portal-dev|staging|internal)\.[a-z]+\.(com|io|net)",
            "leak:internal_url",
            true,
        ),
        pattern(
            r"(?i)/admin/|/webhooks/|/internal/|/debug/",
            "leak:internal_path",
            true,
        ),
        // Other patients
        pattern(
            r"(?i)other patient'?s?\s+(name|phone|email|appointment|record)",
            "leak:other_patient_ref",
            true,
        ),
    ]
});

/// Whole sentences in which the assistant calls itself an AI.
static AI_IDENTITY_SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[^.!?]*\bi('m| am) (a|an) (AI|artificial intelligence|language model|LLM|GPT|Claude|chatbot|chat bot)\b[^.!?]*[.!?]?\s*",
    )
    .unwrap()
});

/// Result of scanning one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputScan {
    /// Nothing matched; send as is.
    Clean,
    /// Sanitizable hits only; send `text` instead.
    Sanitized {
        text: String,
        reasons: Vec<&'static str>,
    },
    /// The reply cannot be salvaged and must not be sent.
    Withheld { reasons: Vec<&'static str> },
}

impl OutputScan {
    pub fn reasons(&self) -> &[&'static str] {
        match self {
            OutputScan::Clean => &[],
            OutputScan::Sanitized { reasons, .. } | OutputScan::Withheld { reasons } => reasons,
        }
    }
}

/// Scans `reply` for leaks of prompts, credentials, infrastructure or other
/// patients' data.
pub fn scan_output(reply: &str) -> OutputScan {
    if reply.trim().is_empty() {
        return OutputScan::Clean;
    }

    let hits: Vec<&LeakPattern> = LEAK_PATTERNS
        .iter()
        .filter(|p| p.re.is_match(reply))
        .collect();
    if hits.is_empty() {
        return OutputScan::Clean;
    }

    let reasons: Vec<&'static str> = hits.iter().map(|p| p.reason).collect();
    if hits.iter().any(|p| p.block) {
        return OutputScan::Withheld { reasons };
    }

    let text = AI_IDENTITY_SENTENCE.replace_all(reply, "").trim().to_string();
    if text.is_empty() {
        OutputScan::Withheld { reasons }
    } else {
        OutputScan::Sanitized { text, reasons }
    }
}
