// core/common/src/config.rs
// Environment-driven service configuration

use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidValue {
                name: "ENVIRONMENT".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub service_sid: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct TumenyConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub session_ttl_hours: u64,
    pub log_format: LogFormat,
    pub otp_rate_limit_per_minute: u32,
    pub twilio: TwilioConfig,
    pub tumeny: TumenyConfig,
}

impl ServiceConfig {
    /// Load `.env` (if present) and read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required =
            |name: &str| get(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        let environment = match get("ENVIRONMENT") {
            Some(value) => value.parse()?,
            None => Environment::Development,
        };

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("JWT_SECRET".to_string()))
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            environment,
            port: parse_or("PORT", get("PORT"), 8090)?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5)?,
            jwt_secret,
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", get("SESSION_TTL_HOURS"), 12)?,
            log_format,
            otp_rate_limit_per_minute: parse_or(
                "OTP_RATE_LIMIT_PER_MINUTE",
                get("OTP_RATE_LIMIT_PER_MINUTE"),
                5,
            )?,
            twilio: TwilioConfig {
                account_sid: required("TWILIO_ACCOUNT_SID")?,
                auth_token: required("TWILIO_AUTH_TOKEN")?,
                service_sid: required("TWILIO_SERVICE_SID")?,
                base_url: get("TWILIO_VERIFY_URL")
                    .unwrap_or_else(|| "https://verify.twilio.com".to_string()),
            },
            tumeny: TumenyConfig {
                api_key: required("TUMENY_API_KEY")?,
                api_secret: required("TUMENY_API_SECRET")?,
                base_url: get("TUMENY_BASE_URL")
                    .unwrap_or_else(|| "https://tumeny.herokuapp.com".to_string()),
            },
        })
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}
