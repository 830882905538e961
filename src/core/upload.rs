use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::core::auth;
use crate::core::config::AppConfig;
use crate::core::models::aggregate::UploadPayload;

const COLLECT_PATH: &str = "/api/usage/collect/";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub fn user_agent() -> String {
    format!("ai-usage-tracker-cli/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No API token configured. Run `ai-usage-tracker configure <TOKEN>` or set AI_USAGE_TRACKER_TOKEN")]
    MissingToken,
    #[error("Authentication failed: check your API token")]
    Unauthorized,
    #[error("Rate limited by the dashboard: will retry next cycle")]
    RateLimited,
    #[error("Dashboard rejected the payload: {detail}")]
    BadRequest { detail: String },
    #[error("Payload too large for the dashboard")]
    PayloadTooLarge,
    #[error("Upload failed with HTTP {status}: {detail}")]
    Failed { status: u16, detail: String },
    #[error("Upload timed out")]
    Timeout,
    #[error("Failed to reach dashboard: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Failed to encode upload: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e)
        }
    }
}

/// Pull a human-readable reason out of an error body.
fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(text) = json.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.chars().take(200).collect()
}

/// Posts payloads to the dashboard collection endpoint.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    jwt_secret: String,
}

impl Uploader {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        jwt_secret: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            token,
            jwt_secret: jwt_secret.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, UploadError> {
        Self::new(config.api_url(), config.api_token(), config.server_jwt_secret())
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), COLLECT_PATH)
    }

    /// Send one payload. Each call is a single attempt.
    pub async fn send<I, M>(&self, payload: &UploadPayload<I, M>) -> Result<String, UploadError>
    where
        I: Serialize,
        M: Serialize,
    {
        let token = self.token.as_deref().ok_or(UploadError::MissingToken)?;
        let server_jwt = auth::create_server_jwt(&self.jwt_secret, Utc::now())
            .map_err(|e| UploadError::Encode(e.to_string()))?;
        let body = serde_json::to_vec(payload).map_err(|e| UploadError::Encode(e.to_string()))?;

        tracing::debug!(
            tool = payload.tool.id(),
            records = payload.daily_aggregates.len(),
            bytes = body.len(),
            endpoint = %self.endpoint(),
            "uploading usage"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Token {}", token))
            .header("X-Tracker-Auth", format!("ServerBearer {}", server_jwt))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match status {
            200..=299 => {
                let message = serde_json::from_str::<serde_json::Value>(&text)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "Data sent successfully".to_string());
                Ok(message)
            }
            400 => Err(UploadError::BadRequest {
                detail: error_detail(&text),
            }),
            401 => Err(UploadError::Unauthorized),
            413 => Err(UploadError::PayloadTooLarge),
            429 => Err(UploadError::RateLimited),
            _ => Err(UploadError::Failed {
                status,
                detail: error_detail(&text),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::aggregate::{DailyAggregate, Metrics, ClaudeMetrics};
    use crate::core::providers::Tool;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> UploadPayload<serde_json::Value, serde_json::Value> {
        UploadPayload {
            tool: Tool::Claude,
            daily_aggregates: vec![DailyAggregate {
                date: "2024-01-01".to_string(),
                model: "m1".to_string(),
                kind: None,
                included_in_subscription: None,
                metrics: Metrics::Claude(ClaudeMetrics {
                    input_tokens: 7,
                    output_tokens: 4,
                    total_tokens: 11,
                    cost: 0.15,
                    requests: 2,
                    ..Default::default()
                }),
            }],
            collection_info: serde_json::json!({"tool": "claude"}),
            metadata: serde_json::json!({}),
            totals: None,
        }
    }

    async fn server_returning(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COLLECT_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn uploader(url: &str) -> Uploader {
        Uploader::new(url, Some("abc".to_string()), "test-secret").unwrap()
    }

    #[tokio::test]
    async fn send_success_returns_message_and_sets_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COLLECT_PATH))
            .and(header("Authorization", "Token abc"))
            .and(header("User-Agent", user_agent().as_str()))
            .and(header_exists("X-Tracker-Auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":"stored 1"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let message = uploader(&server.uri()).send(&payload()).await.unwrap();
        assert_eq!(message, "stored 1");

        let requests = server.received_requests().await.unwrap();
        let auth_header = requests[0]
            .headers
            .get("x-tracker-auth")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let jwt = auth_header.strip_prefix("ServerBearer ").unwrap();

        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_audience(&["django-backend"]);
        validation.set_issuer(&["ai-usage-tracker-cli"]);
        let decoded = jsonwebtoken::decode::<serde_json::Value>(
            jwt,
            &jsonwebtoken::DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();
        let claims = decoded.claims;
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            300
        );

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["tool"], "claude");
        assert_eq!(body["daily_aggregates"][0]["input_tokens"], 7);
    }

    #[tokio::test]
    async fn send_success_without_message_uses_default() {
        let server = server_returning(200, "ok").await;
        let message = uploader(&server.uri()).send(&payload()).await.unwrap();
        assert_eq!(message, "Data sent successfully");
    }

    #[tokio::test]
    async fn unauthorized_and_rate_limited_are_distinct() {
        let server = server_returning(401, "").await;
        let err = uploader(&server.uri()).send(&payload()).await.unwrap_err();
        assert!(matches!(err, UploadError::Unauthorized));

        let server = server_returning(429, "").await;
        let err = uploader(&server.uri()).send(&payload()).await.unwrap_err();
        assert!(matches!(err, UploadError::RateLimited));
    }

    #[tokio::test]
    async fn bad_request_carries_detail() {
        let server = server_returning(400, r#"{"error":"missing daily_aggregates"}"#).await;
        let err = uploader(&server.uri()).send(&payload()).await.unwrap_err();
        match err {
            UploadError::BadRequest { detail } => assert_eq!(detail, "missing daily_aggregates"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn payload_too_large_and_other_failures() {
        let server = server_returning(413, "").await;
        let err = uploader(&server.uri()).send(&payload()).await.unwrap_err();
        assert!(matches!(err, UploadError::PayloadTooLarge));

        let server = server_returning(502, "bad gateway").await;
        let err = uploader(&server.uri()).send(&payload()).await.unwrap_err();
        assert!(matches!(err, UploadError::Failed { status: 502, .. }));
    }

    #[tokio::test]
    async fn missing_token_never_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let uploader = Uploader::new(server.uri(), None, "secret").unwrap();
        let err = uploader.send(&payload()).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingToken));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let uploader = Uploader::new("https://dash.example.com/", None, "s").unwrap();
        assert_eq!(uploader.endpoint(), "https://dash.example.com/api/usage/collect/");
    }

    #[test]
    fn error_detail_falls_back_to_body() {
        assert_eq!(error_detail(r#"{"detail":"nope"}"#), "nope");
        assert_eq!(error_detail("plain text"), "plain text");
    }
}
