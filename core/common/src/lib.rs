// core/common/src/lib.rs
// Loanpay Common Library - shared functionality for the repayment services

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod validation;

// Re-export commonly used items
pub use auth::{extract_bearer_token, AuthError, Claims, JwtManager};
pub use config::{ConfigError, Environment, LogFormat, ServiceConfig, TumenyConfig, TwilioConfig};
pub use error::{ErrorResponse, ServiceError};
pub use health::{
    check_database_health, check_external_api_health, DependencyHealth, HealthResponse,
    HealthStatus, LivenessProbe, ReadinessProbe,
};
pub use logging::{
    generate_request_id, init_console_logging, init_logging, log_auth_attempt,
    log_external_api_call, log_failure, log_success, log_validation_error, mask_phone,
    sanitize_for_logging, LogContext,
};
pub use metrics::{MetricsTimer, RepaymentMetrics, ServiceMetrics};
pub use middleware::{configure_rate_limits, MetricsMiddleware, RateLimitMiddleware};
pub use rate_limit::{start_cleanup_task, RateLimit, RateLimitError, RateLimitInfo, RateLimiter};
pub use validation::{
    normalize_phone, sanitize_string, validate_amount, validate_fee, validate_otp_code,
    validate_phone, ValidationError,
};
