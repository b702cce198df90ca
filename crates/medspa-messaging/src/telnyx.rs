// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telnyx REST client for outbound SMS and hosted-number order status.

use std::time::Duration;

use async_trait::async_trait;
use medspa_config::model::TelnyxConfig;
use medspa_core::types::{HostedOrderStatus, SmsRequest, SmsSendResult};
use medspa_core::{HostedOrderClient, MedspaError, SmsSender};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.telnyx.com/v2";
const CLIENT_USER_AGENT: &str = concat!("medspa/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    from: &'a str,
    to: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    messaging_profile_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DataWrapper<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    id: String,
    /// Message-level status; Telnyx also reports it per recipient.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    to: Vec<Recipient>,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostedOrderResource {
    status: String,
    #[serde(default)]
    last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrors {
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// HTTP client for the Telnyx v2 API.
///
/// Retries 429 and 5xx responses with exponential backoff.
#[derive(Debug, Clone)]
pub struct TelnyxClient {
    client: reqwest::Client,
    base_url: String,
    messaging_profile_id: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl TelnyxClient {
    pub fn new(api_key: &str) -> Result<Self, MedspaError> {
        if api_key.trim().is_empty() {
            return Err(MedspaError::Config("telnyx.api_key is required".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| MedspaError::Config(format!("invalid Telnyx API key: {e}")))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MedspaError::Messaging {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            messaging_profile_id: None,
            max_retries: 2,
            backoff: Duration::from_millis(250),
        })
    }

    /// Builds a client from the `[telnyx]` section. `None` when no API key
    /// is configured.
    pub fn from_config(config: &TelnyxConfig) -> Result<Option<Self>, MedspaError> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let mut client = Self::new(api_key)?.with_base_url(&config.base_url);
        client.messaging_profile_id = config.messaging_profile_id.clone();
        Ok(Some(client))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_messaging_profile(mut self, id: impl Into<String>) -> Self {
        self.messaging_profile_id = Some(id.into());
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        request: impl Fn() -> reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, MedspaError> {
        let mut attempt = 0;
        loop {
            let result = request().send().await;
            let retryable = match &result {
                Ok(response) => is_retryable(response.status()),
                Err(e) => e.is_timeout() || e.is_connect(),
            };
            if retryable && attempt < self.max_retries {
                let delay = self.backoff * 2u32.pow(attempt);
                match &result {
                    Ok(response) => warn!(path, status = %response.status(), attempt, "telnyx request failed, retrying"),
                    Err(e) => warn!(path, error = %e, attempt, "telnyx request failed, retrying"),
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let response = result.map_err(|e| MedspaError::Messaging {
                message: format!("telnyx request to {path} failed: {e}"),
                source: Some(Box::new(e)),
            })?;
            let status = response.status();
            debug!(path, status = %status, attempt, "telnyx response received");
            let body = response.text().await.map_err(|e| MedspaError::Messaging {
                message: format!("failed to read telnyx response: {e}"),
                source: Some(Box::new(e)),
            })?;
            if !status.is_success() {
                return Err(MedspaError::messaging(api_error_message(status, &body)));
            }
            let wrapper: DataWrapper<T> =
                serde_json::from_str(&body).map_err(|e| MedspaError::Messaging {
                    message: format!("failed to decode telnyx response: {e}"),
                    source: Some(Box::new(e)),
                })?;
            return Ok(wrapper.data);
        }
    }
}

#[async_trait]
impl SmsSender for TelnyxClient {
    async fn send_sms(&self, request: &SmsRequest) -> Result<SmsSendResult, MedspaError> {
        if request.from.trim().is_empty() || request.to.trim().is_empty() {
            return Err(MedspaError::Validation("from and to numbers required".into()));
        }
        if request.body.trim().is_empty() {
            return Err(MedspaError::Validation("message body required".into()));
        }
        let body = SendMessageBody {
            from: &request.from,
            to: &request.to,
            text: &request.body,
            messaging_profile_id: self.messaging_profile_id.as_deref(),
        };
        let url = self.url("messages");
        let message: MessageResource = self
            .invoke(|| self.client.post(&url).json(&body), "messages")
            .await?;
        let status = message
            .status
            .or_else(|| message.to.into_iter().find_map(|r| r.status))
            .filter(|s| !s.is_empty());
        Ok(SmsSendResult {
            provider_message_id: message.id,
            status,
        })
    }
}

#[async_trait]
impl HostedOrderClient for TelnyxClient {
    async fn get_hosted_order(
        &self,
        provider_order_id: &str,
    ) -> Result<HostedOrderStatus, MedspaError> {
        if provider_order_id.trim().is_empty() {
            return Err(MedspaError::Validation("hosted order id required".into()));
        }
        let path = format!("hosted_messaging/orders/{provider_order_id}");
        let url = self.url(&path);
        let order: HostedOrderResource = self.invoke(|| self.client.get(&url), &path).await?;
        Ok(HostedOrderStatus {
            status: order.status,
            last_error: order.last_error.filter(|e| !e.is_empty()),
        })
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ApiErrors>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
        .map(|e| {
            let code = e.code.map(|c| format!(" [{c}]")).unwrap_or_default();
            let text = e.detail.or(e.title).unwrap_or_default();
            format!("{text}{code}")
        });
    match detail {
        Some(detail) => format!("telnyx returned {status}: {detail}"),
        None => format!("telnyx returned {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TelnyxClient {
        TelnyxClient::new("KEY123")
            .unwrap()
            .with_base_url(server.uri())
            .with_backoff(Duration::from_millis(5))
    }

    fn sms() -> SmsRequest {
        SmsRequest {
            from: "+15559990000".into(),
            to: "+15550001111".into(),
            body: "Hello from Glow".into(),
        }
    }

    #[tokio::test]
    async fn send_sms_posts_message_and_reads_recipient_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer KEY123"))
            .and(body_json(serde_json::json!({
                "from": "+15559990000",
                "to": "+15550001111",
                "text": "Hello from Glow",
                "messaging_profile_id": "prof-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "msg-abc", "to": [{"phone_number": "+15550001111", "status": "queued"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .with_messaging_profile("prof-1")
            .send_sms(&sms())
            .await
            .unwrap();
        assert_eq!(result.provider_message_id, "msg-abc");
        assert_eq!(result.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn send_sms_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"id": "msg-2"}})),
            )
            .mount(&server)
            .await;

        let result = client(&server).send_sms(&sms()).await.unwrap();
        assert_eq!(result.provider_message_id, "msg-2");
        assert_eq!(result.status, None);
    }

    #[tokio::test]
    async fn client_errors_surface_telnyx_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "errors": [{"code": "40310", "title": "Invalid 'to' address", "detail": "The 'to' number is not SMS capable."}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).send_sms(&sms()).await.unwrap_err().to_string();
        assert!(err.contains("not SMS capable"), "{err}");
        assert!(err.contains("40310"), "{err}");
    }

    #[tokio::test]
    async fn empty_body_is_rejected_locally() {
        let server = MockServer::start().await;
        let mut request = sms();
        request.body = "  ".into();
        let err = client(&server).send_sms(&request).await.unwrap_err();
        assert!(matches!(err, MedspaError::Validation(_)));
    }

    #[tokio::test]
    async fn hosted_order_status_is_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hosted_messaging/orders/ord-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "ord-9", "status": "failed", "phone_number": "+15559990000", "last_error": "LOA rejected"}
            })))
            .mount(&server)
            .await;

        let status = client(&server).get_hosted_order("ord-9").await.unwrap();
        assert_eq!(status.status, "failed");
        assert_eq!(status.last_error.as_deref(), Some("LOA rejected"));
    }

    #[test]
    fn from_config_without_key_is_disabled() {
        assert!(TelnyxClient::from_config(&TelnyxConfig::default()).unwrap().is_none());
    }
}
