// core/repayment-service/src/handlers/metrics.rs
// Prometheus exposition endpoint

use actix_web::{web, HttpResponse};
use loanpay_common::ServiceError;
use prometheus::{Encoder, Registry, TextEncoder};

pub async fn metrics_handler(registry: web::Data<Registry>) -> Result<HttpResponse, ServiceError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("failed to encode metrics: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer))
}
