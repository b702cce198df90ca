// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API adapter.
//!
//! [`AnthropicLlm`] implements [`LlmClient`] so the LLM supervisor can review
//! drafts without knowing the wire format.

pub mod client;
pub mod types;

use async_trait::async_trait;
use medspa_config::model::AnthropicConfig;
use medspa_core::types::LlmRequest;
use medspa_core::{LlmClient, MedspaError};
use tracing::debug;

pub use client::AnthropicClient;
use types::{ApiMessage, MessageRequest};

/// [`LlmClient`] backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicLlm {
    client: AnthropicClient,
}

impl AnthropicLlm {
    pub fn new(client: AnthropicClient) -> Self {
        Self { client }
    }

    /// Builds a client from configuration. The API key comes from
    /// `anthropic.api_key`, falling back to `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self, MedspaError> {
        let api_key = resolve_api_key(config.api_key.as_deref()).ok_or_else(|| {
            MedspaError::Config(
                "anthropic.api_key is not set and ANTHROPIC_API_KEY is missing".into(),
            )
        })?;
        let client = AnthropicClient::new(&api_key)?.with_base_url(&config.base_url);
        Ok(Self::new(client))
    }
}

fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
        })
}

#[async_trait]
impl LlmClient for AnthropicLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<String, MedspaError> {
        let api_request = MessageRequest {
            model: request.model.clone(),
            messages: vec![ApiMessage::user(request.prompt.clone())],
            system: (!request.system.is_empty()).then(|| request.system.clone()),
            max_tokens: request.max_tokens,
        };
        let response = self.client.complete_message(&api_request).await?;
        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = response.stop_reason.as_deref().unwrap_or(""),
            "anthropic completion"
        );
        Ok(response.text())
    }
}
