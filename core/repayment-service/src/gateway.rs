// core/repayment-service/src/gateway.rs
// TuMeNy mobile money gateway: bearer token cache, payment initiation and status polling

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use loanpay_common::{
    check_external_api_health, log_external_api_call, sanitize_for_logging, sanitize_string,
    DependencyHealth, ServiceError, TumenyConfig,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::month::MonthKey;

const PAYMENT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_ORGANISATION_NAME: usize = 100;
// Refresh slightly early so a token never expires mid-request
const TOKEN_REFRESH_MARGIN_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to obtain gateway token: {0}")]
    AuthFailed(String),
    #[error("payment request timed out")]
    Timeout,
    #[error("could not connect to payment gateway: {0}")]
    Connection(String),
    #[error("payment gateway returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid payment gateway response: {0}")]
    Parse(String),
}

impl GatewayError {
    pub fn tag(&self) -> String {
        match self {
            GatewayError::AuthFailed(_) => "auth_failed".to_string(),
            GatewayError::Timeout => "timeout".to_string(),
            GatewayError::Connection(_) => "connection".to_string(),
            GatewayError::Http { status, .. } => format!("http_{}", status),
            GatewayError::Parse(_) => "parse_error".to_string(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Connection(err.to_string())
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::external("payment_gateway", err.tag(), err.to_string())
    }
}

/// Settlement state reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed { reason: String },
    Pending,
    Error { reason: String },
}

impl PaymentStatus {
    pub fn from_gateway(status: &str) -> Self {
        let status = status.trim().to_uppercase();
        match status.as_str() {
            "SUCCESS" => PaymentStatus::Success,
            "CANCELLED" | "CANCELED" | "FAILED" | "DECLINED" => PaymentStatus::Failed {
                reason: status.to_lowercase(),
            },
            _ => PaymentStatus::Pending,
        }
    }

    pub fn api_error() -> Self {
        PaymentStatus::Error {
            reason: "api_error".to_string(),
        }
    }

    /// No further polling will change the outcome.
    pub fn is_completed(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Failed { .. } => "failed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Error { .. } => "error",
        }
    }
}

/// Payment request body in the gateway's wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub description: String,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub email: Option<String>,
    pub phone_number: String,
    /// Whole currency units
    pub amount: i64,
}

impl PaymentRequest {
    pub fn new(
        organisation_name: &str,
        month: MonthKey,
        loan_ids: &[Uuid],
        email: Option<String>,
        phone_number: &str,
        amount: i64,
    ) -> Self {
        let ids: Vec<String> = loan_ids.iter().map(Uuid::to_string).collect();

        Self {
            description: format!(
                "{} {} payment for loan {}",
                sanitize_string(organisation_name, MAX_ORGANISATION_NAME),
                month.display_name(),
                ids.join(", ")
            ),
            customer_first_name: "Customer".to_string(),
            customer_last_name: "Name".to_string(),
            email,
            phone_number: phone_number.to_string(),
            amount,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Submit a payment; returns the gateway-assigned payment id.
    async fn initiate(&self, request: &PaymentRequest) -> Result<String, GatewayError>;

    async fn poll(&self, payment_id: &str) -> PaymentStatus;

    async fn health(&self) -> DependencyHealth;
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Naive timestamps are UTC; a bare date is its midnight
    [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
    .map(|naive| naive.and_utc())
}

fn seconds_from(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_seconds(secs).and_then(|d| now.checked_add_signed(d))
}

/// Interpret the token endpoint's `expireAt`.
///
/// Accepts `{"date": "<datetime>"}`, a number of seconds, a datetime string or
/// a string of seconds. Anything else expires an hour from `now`.
pub fn parse_token_expiry(expire_at: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
    let fallback = now + ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);

    let parsed = match expire_at {
        Value::Object(map) => map.get("date").and_then(Value::as_str).and_then(parse_datetime),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| seconds_from(now, secs)),
        Value::String(s) => parse_datetime(s).or_else(|| {
            s.trim()
                .parse::<i64>()
                .ok()
                .and_then(|secs| seconds_from(now, secs))
        }),
        _ => None,
    };

    parsed.unwrap_or_else(|| {
        tracing::warn!(expire_at = %expire_at, "Unrecognised token expiry, assuming one hour");
        fallback
    })
}

/// Gateway payment id from an initiation response: `payment.id`, else top-level `id`.
pub fn extract_payment_id(body: &Value) -> Option<String> {
    let id = body
        .get("payment")
        .and_then(|p| p.get("id"))
        .filter(|v| !v.is_null())
        .or_else(|| body.get("id"))?;

    match id {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct TumenyClient {
    client: Client,
    config: TumenyConfig,
    token: Mutex<Option<AccessToken>>,
}

impl TumenyClient {
    pub fn new(client: Client, config: TumenyConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn request_token(&self) -> Result<AccessToken, GatewayError> {
        let url = self.url("/api/token");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("apiKey", &self.config.api_key)
            .header("apiSecret", &self.config.api_secret)
            .send()
            .await
            .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;

        log_external_api_call(
            "tumeny_token",
            &url,
            start.elapsed().as_millis() as u64,
            Some(response.status().as_u16()),
        );

        if !response.status().is_success() {
            return Err(GatewayError::AuthFailed(format!(
                "token endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::AuthFailed("token not found in response".to_string()))?;

        let expire_at = body
            .get("expireAt")
            .filter(|v| !v.is_null())
            .ok_or_else(|| GatewayError::AuthFailed("expireAt not found in response".to_string()))?;

        let expires_at = parse_token_expiry(expire_at, Utc::now());
        tracing::info!(expires_at = %expires_at, "Payment gateway token acquired");

        Ok(AccessToken {
            token: token.to_string(),
            expires_at,
        })
    }

    /// Fetch a token eagerly; used at startup where failure is fatal.
    pub async fn authenticate(&self) -> Result<(), GatewayError> {
        let token = self.request_token().await?;
        *self.token.lock().await = Some(token);
        Ok(())
    }

    async fn bearer_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        tracing::info!("Payment gateway token missing or expired, refreshing");
        let token = self.request_token().await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        let token = self.bearer_token().await?;
        let url = self.url(&format!("/api/v1/payment/{}", payment_id));
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        log_external_api_call(
            "tumeny_payment_status",
            &url,
            start.elapsed().as_millis() as u64,
            Some(status.as_u16()),
        );

        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message: status.to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let reported = body
            .get("payment")
            .and_then(|p| p.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("");

        Ok(PaymentStatus::from_gateway(reported))
    }
}

#[async_trait]
impl PaymentGateway for TumenyClient {
    async fn initiate(&self, request: &PaymentRequest) -> Result<String, GatewayError> {
        let token = self.bearer_token().await?;
        let url = self.url("/api/v1/payment");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .timeout(PAYMENT_TIMEOUT)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        log_external_api_call(
            "tumeny_payment",
            &url,
            start.elapsed().as_millis() as u64,
            Some(status.as_u16()),
        );

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body = %sanitize_for_logging(&text),
                "Payment initiation rejected"
            );
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .or_else(|| (!text.trim().is_empty()).then(|| text.clone()))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

            return Err(GatewayError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        extract_payment_id(&body)
            .ok_or_else(|| GatewayError::Parse("payment id missing from response".to_string()))
    }

    async fn poll(&self, payment_id: &str) -> PaymentStatus {
        match self.fetch_status(payment_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(
                    payment_id = payment_id,
                    tag = %err.tag(),
                    error = %err,
                    "Failed to check payment status"
                );
                PaymentStatus::api_error()
            }
        }
    }

    async fn health(&self) -> DependencyHealth {
        check_external_api_health(&self.client, "payment_gateway", &self.config.base_url).await
    }
}
