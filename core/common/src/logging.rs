// core/common/src/logging.rs
// Structured JSON logging with correlation IDs

use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

/// Initialize structured logging for a service
pub fn init_logging(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true),
        )
        .init();

    info!(service = service_name, "Logging initialized");
}

/// Initialize simple console logging (for development)
pub fn init_console_logging(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty().with_target(true))
        .init();

    info!(service = service_name, "Console logging initialized");
}

/// Generate a correlation ID for request tracing
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Context for structured logging
#[derive(Debug, Clone)]
pub struct LogContext {
    pub request_id: String,
    /// Always stored masked
    pub phone: Option<String>,
    pub organisation_id: Option<String>,
}

impl LogContext {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            phone: None,
            organisation_id: None,
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(mask_phone(phone));
        self
    }

    pub fn with_organisation(mut self, organisation_id: impl ToString) -> Self {
        self.organisation_id = Some(organisation_id.to_string());
        self
    }
}

pub fn log_success(ctx: &LogContext, action: &str, details: Option<&str>) {
    info!(
        request_id = %ctx.request_id,
        phone = ?ctx.phone,
        organisation_id = ?ctx.organisation_id,
        action = action,
        details = ?details,
        "Operation successful"
    );
}

pub fn log_failure(ctx: &LogContext, action: &str, error: &str) {
    error!(
        request_id = %ctx.request_id,
        phone = ?ctx.phone,
        organisation_id = ?ctx.organisation_id,
        action = action,
        error = error,
        "Operation failed"
    );
}

pub fn log_validation_error(ctx: &LogContext, field: &str, reason: &str) {
    warn!(
        request_id = %ctx.request_id,
        phone = ?ctx.phone,
        field = field,
        reason = reason,
        "Validation error"
    );
}

/// Log an OTP verification attempt
pub fn log_auth_attempt(ctx: &LogContext, success: bool) {
    if success {
        info!(
            request_id = %ctx.request_id,
            phone = ?ctx.phone,
            organisation_id = ?ctx.organisation_id,
            "Verification approved"
        );
    } else {
        warn!(
            request_id = %ctx.request_id,
            phone = ?ctx.phone,
            "Verification rejected"
        );
    }
}

pub fn log_rate_limit_exceeded(endpoint: &str, key: &str) {
    warn!(endpoint = endpoint, rate_limit_key = key, "Rate limit exceeded");
}

pub fn log_external_api_call(api_name: &str, url: &str, duration_ms: u64, status_code: Option<u16>) {
    info!(
        api_name = api_name,
        url = url,
        duration_ms = duration_ms,
        status_code = ?status_code,
        "External API call"
    );
}

/// Keep only the last four digits of a phone number.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Redact credentials and tokens before they reach a log line.
pub fn sanitize_for_logging(input: &str) -> String {
    let lower = input.to_lowercase();
    if lower.contains("secret")
        || lower.contains("token")
        || lower.contains("password")
        || lower.contains("bearer")
    {
        "[REDACTED]".to_string()
    } else if input.chars().count() > 100 {
        let prefix: String = input.chars().take(20).collect();
        format!("{}...[REDACTED]", prefix)
    } else {
        input.to_string()
    }
}
