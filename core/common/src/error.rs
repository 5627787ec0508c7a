// core/common/src/error.rs
// Standardized error responses and handling

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: String, error_code: String, message: String) -> Self {
        Self {
            error,
            error_code,
            message,
            details: None,
            request_id: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[derive(Debug)]
pub enum ServiceError {
    // Client errors (4xx)
    ValidationError(String),
    NotFound(String),
    Unauthorized,
    Forbidden,
    Conflict(String),
    RateLimitExceeded(String),
    BadRequest(String),

    // Server errors (5xx)
    DatabaseError(String),
    /// A third-party call failed. `tag` is one of `timeout`, `connection`,
    /// `http_<code>`, `parse_error` or `auth_failed`.
    ExternalServiceError {
        service: String,
        tag: String,
        message: String,
    },
    InternalError(String),
}

impl ServiceError {
    pub fn external(service: &str, tag: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::ExternalServiceError {
            service: service.to_string(),
            tag: tag.into(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> String {
        match self {
            ServiceError::ValidationError(_) => "validation_error".to_string(),
            ServiceError::NotFound(_) => "not_found".to_string(),
            ServiceError::Unauthorized => "unauthorized".to_string(),
            ServiceError::Forbidden => "forbidden".to_string(),
            ServiceError::Conflict(_) => "conflict".to_string(),
            ServiceError::RateLimitExceeded(_) => "rate_limit_exceeded".to_string(),
            ServiceError::BadRequest(_) => "bad_request".to_string(),
            ServiceError::DatabaseError(_) => "database_error".to_string(),
            ServiceError::ExternalServiceError { .. } => "external_service_error".to_string(),
            ServiceError::InternalError(_) => "internal_error".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ServiceError::ValidationError(msg) => msg.clone(),
            ServiceError::NotFound(msg) => msg.clone(),
            ServiceError::Unauthorized => "Unauthorized access".to_string(),
            ServiceError::Forbidden => "Access forbidden".to_string(),
            ServiceError::Conflict(msg) => msg.clone(),
            ServiceError::RateLimitExceeded(msg) => msg.clone(),
            ServiceError::BadRequest(msg) => msg.clone(),
            ServiceError::DatabaseError(msg) => format!("Database error: {}", msg),
            ServiceError::ExternalServiceError { service, tag, message } => {
                format!("External service error ({} {}): {}", service, tag, message)
            }
            ServiceError::InternalError(msg) => format!("Internal error: {}", msg),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::ExternalServiceError { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    pub fn to_error_response(&self, request_id: Option<String>) -> ErrorResponse {
        let mut response = ErrorResponse::new(self.to_string(), self.error_code(), self.message());

        if let ServiceError::ExternalServiceError { service, tag, .. } = self {
            response = response.with_details(serde_json::json!({
                "service": service,
                "tag": tag,
            }));
        }

        if let Some(id) = request_id {
            response = response.with_request_id(id);
        }

        response
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        let error_response = self.to_error_response(None);
        HttpResponse::build(self.status_code()).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.status_code()
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::DatabaseError(err.to_string())
    }
}

impl From<crate::auth::AuthError> for ServiceError {
    fn from(_err: crate::auth::AuthError) -> Self {
        ServiceError::Unauthorized
    }
}

impl From<crate::validation::ValidationError> for ServiceError {
    fn from(err: crate::validation::ValidationError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<crate::rate_limit::RateLimitError> for ServiceError {
    fn from(err: crate::rate_limit::RateLimitError) -> Self {
        match err {
            crate::rate_limit::RateLimitError::LimitExceeded(msg) => {
                ServiceError::RateLimitExceeded(msg)
            }
            crate::rate_limit::RateLimitError::NoLimitConfigured(endpoint) => {
                ServiceError::InternalError(format!("no rate limit configured for {}", endpoint))
            }
        }
    }
}
