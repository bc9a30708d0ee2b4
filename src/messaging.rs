use anyhow::{Context, Result};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RobloxConfig;
use crate::donation::{format_rupiah, DonationRecord};

/// Upper bound on one publish call, connect to last body byte.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body expected by the MessagingService publish API. `message` is
/// the donation record already encoded as a JSON string.
#[derive(Debug, Serialize)]
struct PublishRequest {
    message: String,
}

/// Successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub success: bool,
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The service answered with a non-2xx status.
    #[error("MessagingService rejected the message (HTTP {status}): {body}")]
    RemoteRejected { status: u16, body: Value },

    /// Sent, but nothing came back before the timeout or the connection failed.
    #[error("No response from MessagingService: {reason}")]
    NoResponse { reason: String },

    #[error("Could not send request to MessagingService: {message}")]
    RequestError { message: String },
}

impl ForwardError {
    /// Likely cause for the status codes the publish API documents.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ForwardError::RemoteRejected { status: 401, .. } => {
                Some("API key is invalid or expired")
            }
            ForwardError::RemoteRejected { status: 403, .. } => {
                Some("API key lacks permission for this universe")
            }
            ForwardError::RemoteRejected { status: 404, .. } => {
                Some("Universe ID or topic not found")
            }
            ForwardError::NoResponse { .. } => {
                Some("Could not reach the Roblox API (timeout or network issue)")
            }
            _ => None,
        }
    }

    /// What to echo back to the webhook caller: the remote body when there
    /// is one, the error text otherwise.
    pub fn details(&self) -> Value {
        match self {
            ForwardError::RemoteRejected { body, .. } if !body.is_null() => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Client for the Roblox Open Cloud MessagingService publish endpoint.
#[derive(Clone)]
pub struct MessagingClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl MessagingClient {
    pub fn new(config: &RobloxConfig) -> Result<Self> {
        Self::with_timeout(config, PUBLISH_TIMEOUT)
    }

    pub fn with_timeout(config: &RobloxConfig, timeout: Duration) -> Result<Self> {
        let endpoint = publish_endpoint(config)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Publish one donation. Exactly one request is made; failures are
    /// returned to the caller, never retried.
    pub async fn publish(&self, record: &DonationRecord) -> Result<PublishResult, ForwardError> {
        let message = serde_json::to_string(record).map_err(|e| ForwardError::RequestError {
            message: format!("Failed to encode donation: {e}"),
        })?;

        info!(
            username = %record.username,
            display_name = %record.display_name,
            amount = %format_rupiah(record.amount),
            source = %record.source,
            timestamp = record.timestamp,
            "Publishing donation to MessagingService"
        );
        if record.message.is_empty() {
            debug!("Donation has no message");
        } else {
            debug!("Donation message: {}", record.message);
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .json(&PublishRequest { message })
            .send()
            .await
            .map_err(|e| {
                let err = classify_send_error(&e);
                error!("Failed to publish donation: {}", err);
                if let Some(hint) = err.hint() {
                    error!("  {}", hint);
                }
                err
            })?;

        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => parse_body(&bytes),
            Err(e) if status.is_success() => {
                error!("Publish accepted but response body was lost: {}", e);
                return Err(ForwardError::NoResponse {
                    reason: format!("response body could not be read: {e}"),
                });
            }
            Err(_) => Value::Null,
        };

        if !status.is_success() {
            let err = ForwardError::RemoteRejected {
                status: status.as_u16(),
                body,
            };
            error!("Publish rejected: {}", err);
            if let Some(hint) = err.hint() {
                warn!("  {}", hint);
            }
            return Err(err);
        }

        info!("Published donation (HTTP {})", status);
        debug!("MessagingService response: {}", body);

        Ok(PublishResult {
            success: true,
            status: status.as_u16(),
            body,
        })
    }
}

/// `{base}/messaging-service/v1/universes/{universe}/topics/{topic}` with the
/// universe and topic percent-encoded as path segments.
fn publish_endpoint(config: &RobloxConfig) -> Result<Url> {
    let mut url = Url::parse(&config.base_url)
        .with_context(|| format!("Invalid MessagingService base URL: {}", config.base_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path: {}", config.base_url))?
        .pop_if_empty()
        .extend([
            "messaging-service",
            "v1",
            "universes",
            config.universe_id.as_str(),
            "topics",
            config.topic.as_str(),
        ]);
    Ok(url)
}

fn classify_send_error(e: &reqwest::Error) -> ForwardError {
    if e.is_builder() {
        ForwardError::RequestError {
            message: e.to_string(),
        }
    } else if e.is_timeout() {
        ForwardError::NoResponse {
            reason: format!("timed out: {e}"),
        }
    } else {
        ForwardError::NoResponse {
            reason: e.to_string(),
        }
    }
}

/// JSON if possible, raw text otherwise, `null` for an empty body.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PUBLISH_PATH: &str = "/messaging-service/v1/universes/4242/topics/SiwaDonationBroadcast";

    fn config(base_url: &str) -> RobloxConfig {
        RobloxConfig {
            api_key: "test-api-key-0001".to_string(),
            universe_id: "4242".to_string(),
            topic: "SiwaDonationBroadcast".to_string(),
            base_url: base_url.to_string(),
        }
    }

    fn record() -> DonationRecord {
        DonationRecord {
            username: "Builder_7".to_string(),
            display_name: "Budi".to_string(),
            amount: 15000,
            timestamp: 1_760_000_000,
            source: "Saweria".to_string(),
            message: "[Builder_7] semangat!".to_string(),
            email: "budi@example.com".to_string(),
        }
    }

    #[test]
    fn test_endpoint_layout() {
        let client = MessagingClient::new(&config("https://apis.roblox.com")).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://apis.roblox.com/messaging-service/v1/universes/4242/topics/SiwaDonationBroadcast"
        );
    }

    #[test]
    fn test_publish_timeout_is_ten_seconds() {
        assert_eq!(PUBLISH_TIMEOUT, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_default_client_waits_past_short_delays() {
        // A client from `new` must not give up on a remote that answers
        // within the ten-second window.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .expect(1)
            .mount(&server)
            .await;

        let client = MessagingClient::new(&config(&server.uri())).unwrap();
        let result = client.publish(&record()).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[test]
    fn test_topic_is_percent_encoded() {
        let mut cfg = config("https://apis.roblox.com");
        cfg.topic = "Siwa Donation/Live".to_string();
        let client = MessagingClient::new(&cfg).unwrap();
        assert!(client
            .endpoint()
            .as_str()
            .ends_with("/topics/Siwa%20Donation%2FLive"));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(MessagingClient::new(&config("not a url")).is_err());
    }

    #[test]
    fn test_hints_for_documented_statuses() {
        let rejected = |status| ForwardError::RemoteRejected {
            status,
            body: Value::Null,
        };
        assert!(rejected(401).hint().unwrap().contains("invalid"));
        assert!(rejected(403).hint().unwrap().contains("permission"));
        assert!(rejected(404).hint().unwrap().contains("not found"));
        assert!(rejected(500).hint().is_none());
    }

    #[test]
    fn test_details_prefers_remote_body() {
        let err = ForwardError::RemoteRejected {
            status: 403,
            body: json!({ "error": "PERMISSION_DENIED" }),
        };
        assert_eq!(err.details(), json!({ "error": "PERMISSION_DENIED" }));

        let err = ForwardError::NoResponse {
            reason: "timed out".to_string(),
        };
        assert_eq!(
            err.details(),
            json!("No response from MessagingService: timed out")
        );
    }

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b" \n"), Value::Null);
        assert_eq!(parse_body(br#"{"ok":true}"#), json!({ "ok": true }));
        assert_eq!(parse_body(b"Forbidden"), json!("Forbidden"));
    }

    #[tokio::test]
    async fn test_publish_success_sends_double_encoded_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PUBLISH_PATH))
            .and(header("x-api-key", "test-api-key-0001"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = MessagingClient::new(&config(&server.uri())).unwrap();
        let result = client.publish(&record()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.status, 200);
        assert_eq!(result.body, Value::Null);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let envelope: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let object = envelope.as_object().unwrap();
        assert_eq!(object.len(), 1);
        let inner = object["message"].as_str().unwrap();
        let decoded: DonationRecord = serde_json::from_str(inner).unwrap();
        assert_eq!(decoded, record());
    }

    #[tokio::test]
    async fn test_publish_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "queued": true })))
            .mount(&server)
            .await;

        let client = MessagingClient::new(&config(&server.uri())).unwrap();
        let result = client.publish(&record()).await.unwrap();
        assert_eq!(result.status, 202);
        assert_eq!(result.body, json!({ "queued": true }));
    }

    #[tokio::test]
    async fn test_forbidden_is_remote_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "error": "PERMISSION_DENIED" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = MessagingClient::new(&config(&server.uri())).unwrap();
        let err = client.publish(&record()).await.unwrap_err();
        match err {
            ForwardError::RemoteRejected { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, json!({ "error": "PERMISSION_DENIED" }));
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let client = MessagingClient::new(&config(&server.uri())).unwrap();
        let err = client.publish(&record()).await.unwrap_err();
        assert!(matches!(
            err,
            ForwardError::RemoteRejected { status: 503, ref body } if body == "unavailable"
        ));
    }

    #[tokio::test]
    async fn test_slow_remote_is_no_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client =
            MessagingClient::with_timeout(&config(&server.uri()), Duration::from_millis(200))
                .unwrap();
        let started = std::time::Instant::now();
        let err = client.publish(&record()).await.unwrap_err();
        assert!(matches!(err, ForwardError::NoResponse { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_no_response() {
        // Port 9 (discard) is not listening on test machines.
        let client = MessagingClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client.publish(&record()).await.unwrap_err();
        assert!(matches!(err, ForwardError::NoResponse { .. }));
    }
}
