// core/repayment-service/src/otp.rs
// One-time passcodes delegated to Twilio Verify

use async_trait::async_trait;
use loanpay_common::{log_external_api_call, ServiceError, TwilioConfig};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("request to verification provider timed out")]
    Timeout,
    #[error("could not reach verification provider: {0}")]
    Connection(String),
    #[error("verification provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected verification provider response: {0}")]
    Parse(String),
}

impl OtpError {
    pub fn tag(&self) -> String {
        match self {
            OtpError::Timeout => "timeout".to_string(),
            OtpError::Connection(_) => "connection".to_string(),
            OtpError::Http { status, .. } => format!("http_{}", status),
            OtpError::Parse(_) => "parse_error".to_string(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OtpError::Timeout
        } else if err.is_decode() {
            OtpError::Parse(err.to_string())
        } else {
            OtpError::Connection(err.to_string())
        }
    }
}

impl From<OtpError> for ServiceError {
    fn from(err: OtpError) -> Self {
        ServiceError::external("otp_provider", err.tag(), err.to_string())
    }
}

/// Sends and checks passcodes. No code or expiry is kept locally.
#[async_trait]
pub trait OtpProvider: Send + Sync + 'static {
    /// `true` when the provider accepted the request and a code is on its way.
    async fn send(&self, phone: &str) -> Result<bool, OtpError>;

    /// `true` only when the provider approved the code for this number.
    async fn verify(&self, phone: &str, code: &str) -> Result<bool, OtpError>;
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
}

pub struct TwilioVerifyClient {
    client: Client,
    config: TwilioConfig,
}

impl TwilioVerifyClient {
    pub fn new(client: Client, config: TwilioConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/v2/Services/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.service_sid,
            resource
        )
    }

    async fn post_form(
        &self,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<Option<VerificationResponse>, OtpError> {
        let url = self.url(resource);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await
            .map_err(OtpError::from_reqwest)?;

        let status = response.status();
        log_external_api_call(
            "twilio_verify",
            &url,
            start.elapsed().as_millis() as u64,
            Some(status.as_u16()),
        );

        // Expired, already used or never requested
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let message = response
                .json::<ProviderErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(OtpError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<VerificationResponse>()
            .await
            .map_err(|e| OtpError::Parse(e.to_string()))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl OtpProvider for TwilioVerifyClient {
    async fn send(&self, phone: &str) -> Result<bool, OtpError> {
        let response = self
            .post_form("Verifications", &[("To", phone), ("Channel", "sms")])
            .await?;

        match response {
            Some(body) => Ok(body.status == "pending"),
            None => Err(OtpError::Http {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: "verification service not found".to_string(),
            }),
        }
    }

    async fn verify(&self, phone: &str, code: &str) -> Result<bool, OtpError> {
        let response = self
            .post_form("VerificationCheck", &[("To", phone), ("Code", code.trim())])
            .await?;

        Ok(response.is_some_and(|body| body.status == "approved"))
    }
}
