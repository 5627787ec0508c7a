// core/repayment-service/src/handlers/health.rs
// Health check endpoints

use actix_web::{web, HttpResponse, Result};
use loanpay_common::{HealthResponse, LivenessProbe, ReadinessProbe};

use super::AppState;

const SERVICE_NAME: &str = "repayment-service";

/// Health check endpoint - database and payment gateway
pub async fn health_check(data: web::Data<AppState>) -> Result<HttpResponse> {
    let mut health = HealthResponse::new(SERVICE_NAME, env!("CARGO_PKG_VERSION"), data.start_time)
        .with_features(&["schedule", "otp_sign_in", "mobile_money", "settlement"]);

    health.add_dependency(data.store.health().await);
    health.add_dependency(data.gateway.health().await);

    Ok(HttpResponse::Ok().json(health))
}

/// Liveness probe - is the service alive?
pub async fn liveness_probe() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(LivenessProbe::healthy()))
}

/// Readiness probe - only the database gates traffic
pub async fn readiness_probe(data: web::Data<AppState>) -> Result<HttpResponse> {
    let probe = ReadinessProbe::from_dependencies(vec![data.store.health().await]);

    if probe.ready {
        Ok(HttpResponse::Ok().json(probe))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(probe))
    }
}
