// core/repayment-service/src/main.rs
// Loan repayment service: OTP sign-in, repayment schedules and mobile money settlement

mod checkout;
mod gateway;
mod handlers;
mod identity;
mod ledger;
mod middleware;
mod models;
mod month;
mod otp;
mod schedule;
mod store;

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use loanpay_common::{
    configure_rate_limits, init_console_logging, init_logging, start_cleanup_task, JwtManager,
    LogFormat, MetricsMiddleware, RateLimitMiddleware, RateLimiter, RepaymentMetrics,
    ServiceConfig, ServiceMetrics,
};
use prometheus::Registry;
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::checkout::{start_purge_task, CheckoutStore};
use crate::gateway::TumenyClient;
use crate::handlers::AppState;
use crate::middleware::auth::AuthMiddleware;
use crate::otp::TwilioVerifyClient;
use crate::store::PgLoanStore;

const SERVICE_NAME: &str = "repayment-service";
const CHECKOUT_MAX_AGE_HOURS: i64 = 24;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    tracing::error!(error = %err, "{}", context);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = ServiceConfig::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    match config.log_format {
        LogFormat::Json => init_logging(SERVICE_NAME),
        LogFormat::Pretty => init_console_logging(SERVICE_NAME),
    }
    tracing::info!(
        environment = ?config.environment,
        port = config.port,
        "Starting repayment service"
    );

    // Database
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    tracing::info!("Database connection established");

    // One client per provider, shared by all workers
    let twilio_http = reqwest::Client::builder()
        .build()
        .map_err(|e| startup_error("Failed to build OTP client", e))?;
    let tumeny_http = reqwest::Client::builder()
        .build()
        .map_err(|e| startup_error("Failed to build gateway client", e))?;

    let gateway = TumenyClient::new(tumeny_http, config.tumeny.clone());
    gateway
        .authenticate()
        .await
        .map_err(|e| startup_error("Payment gateway authentication failed", e))?;

    // Prometheus metrics
    let registry = Registry::new();
    let service_metrics = ServiceMetrics::new(&registry, "repayment_service")
        .map_err(|e| startup_error("Failed to create service metrics", e))?;
    let repayment_metrics = RepaymentMetrics::new(&registry)
        .map_err(|e| startup_error("Failed to create repayment metrics", e))?;
    tracing::info!("Metrics initialized");

    // Rate limiter
    let mut rate_limiter = RateLimiter::new();
    configure_rate_limits(&mut rate_limiter, config.otp_rate_limit_per_minute);
    let rate_limiter = Arc::new(rate_limiter);
    start_cleanup_task(rate_limiter.clone());
    tracing::info!("Rate limiter initialized");

    let checkouts = Arc::new(CheckoutStore::new());
    start_purge_task(
        checkouts.clone(),
        chrono::Duration::hours(CHECKOUT_MAX_AGE_HOURS),
    );

    let jwt_manager = JwtManager::new(config.jwt_secret.clone());

    let state = web::Data::new(AppState {
        store: Arc::new(PgLoanStore::new(db_pool)),
        otp: Arc::new(TwilioVerifyClient::new(twilio_http, config.twilio.clone())),
        gateway: Arc::new(gateway),
        jwt_manager: jwt_manager.clone(),
        checkouts,
        metrics: repayment_metrics,
        session_ttl_hours: config.session_ttl_hours,
        start_time: SystemTime::now(),
    });
    let registry_data = web::Data::new(registry);

    tracing::info!(port = config.port, "Starting HTTP server");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:5173")
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            // Runs innermost: claims are in place before handlers
            .wrap(AuthMiddleware::new(jwt_manager.clone()))
            .wrap(MetricsMiddleware::new(service_metrics.clone()))
            .wrap(RateLimitMiddleware::new(rate_limiter.clone()))
            .wrap(cors)
            .wrap(
                actix_middleware::DefaultHeaders::new()
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("Cache-Control", "no-store")),
            )
            .wrap(actix_middleware::Logger::default())
            .app_data(state.clone())
            .app_data(registry_data.clone())
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
