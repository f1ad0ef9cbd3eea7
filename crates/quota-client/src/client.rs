//! HTTP client for the enforcement API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quota_core::ClientRateGauge;
use quota_core::ports::LocalStore;
use quota_infra::FileLocalStore;
use quota_shared::ErrorResponse;
use quota_shared::dto::{EnforceRequest, QuotaUsageResponse};
use reqwest::StatusCode;

use crate::error::ClientError;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct QuotaClientConfig {
    pub base_url: String,
    /// Bearer token identifying the principal.
    pub token: String,
    pub timeout: Duration,
}

impl QuotaClientConfig {
    /// Load configuration from `QUOTA_SERVER_URL`, `QUOTA_TOKEN` and
    /// `QUOTA_CLIENT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("QUOTA_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            token: std::env::var("QUOTA_TOKEN").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("QUOTA_CLIENT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

pub struct QuotaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    gauge: ClientRateGauge,
}

impl QuotaClient {
    pub fn new(config: QuotaClientConfig, store: Arc<dyn LocalStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            gauge: ClientRateGauge::new(store),
        })
    }

    /// Client with a file-backed gauge, configured from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(
            QuotaClientConfig::from_env(),
            Arc::new(FileLocalStore::from_env()),
        )
    }

    pub fn gauge(&self) -> &ClientRateGauge {
        &self.gauge
    }

    /// Ask the server to record one guarded call in `scope`.
    pub async fn enforce(&self, scope: &str) -> Result<QuotaUsageResponse, ClientError> {
        let now_ms = Utc::now().timestamp_millis();

        let advice = self.gauge.check_and_advise(now_ms);
        if !advice.allowed {
            tracing::debug!(
                scope,
                status = ?advice.status,
                cooldown_secs = advice.cooldown_secs,
                "Throttling call before it reaches the server"
            );
            return Err(ClientError::Throttled {
                cooldown_secs: advice.cooldown_secs,
            });
        }

        self.gauge.record_call(now_ms);

        let response = self
            .http
            .post(format!("{}/api/quota/enforce", self.base_url))
            .bearer_auth(&self.token)
            .json(&EnforceRequest {
                scope: scope.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        self.interpret(status, &body, now_ms)
    }

    /// Current usage for `scope`, without recording a call.
    pub async fn usage(&self, scope: &str) -> Result<QuotaUsageResponse, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/quota/usage", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("scope", scope)])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        decode(status, &body)
    }

    /// Map an enforcement response, starting a cooldown on limit rejections.
    fn interpret(
        &self,
        status: StatusCode,
        body: &[u8],
        now_ms: i64,
    ) -> Result<QuotaUsageResponse, ClientError> {
        let result = decode(status, body);
        if let Err(ClientError::Rejected(problem)) = &result {
            if problem.is_limit() {
                tracing::info!(
                    kind = %problem.kind,
                    retry_after = ?problem.retry_after_seconds,
                    "Server rejected call, starting local cooldown"
                );
                self.gauge.trigger_cooldown(now_ms);
            }
        }
        result
    }
}

fn decode(status: StatusCode, body: &[u8]) -> Result<QuotaUsageResponse, ClientError> {
    if status.is_success() {
        return Ok(serde_json::from_slice(body)?);
    }

    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            quota: Some(problem),
            ..
        }) => Err(ClientError::Rejected(problem)),
        Ok(problem) => Err(ClientError::Status {
            status: status.as_u16(),
            title: problem.title,
        }),
        Err(_) => Err(ClientError::Status {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }),
    }
}
