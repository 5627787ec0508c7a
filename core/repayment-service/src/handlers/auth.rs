// core/repayment-service/src/handlers/auth.rs
// Phone lookup, OTP send and OTP verify (issues the session token)

use actix_web::{web, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use loanpay_common::{
    generate_request_id, log_auth_attempt, log_failure, log_success, log_validation_error,
    mask_phone, normalize_phone, validate_otp_code, validate_phone, LogContext, ServiceError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::identity::LookupOutcome;

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub sent: bool,
    /// Masked; the full number never leaves the server again
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub organisation_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Registered phone numbers only; anything else is NotFound.
async fn registered(
    state: &AppState,
    raw_phone: &str,
    ctx: &LogContext,
) -> Result<LookupOutcome, ServiceError> {
    let outcome = state.identity().lookup(raw_phone).await?;

    if !outcome.found {
        log_validation_error(ctx, "phone", "not registered to an organisation");
        return Err(ServiceError::NotFound(
            "Phone number is not registered to an organisation".to_string(),
        ));
    }

    Ok(outcome)
}

pub async fn lookup(
    data: web::Data<AppState>,
    req: web::Json<PhoneRequest>,
) -> Result<HttpResponse, ServiceError> {
    let outcome = data.identity().lookup(&req.phone).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn send_otp(
    data: web::Data<AppState>,
    req: web::Json<PhoneRequest>,
) -> Result<HttpResponse, ServiceError> {
    let phone = normalize_phone(&req.phone);
    let ctx = LogContext::new(generate_request_id()).with_phone(&phone);
    let counter = |outcome: &str| {
        data.metrics
            .otp_requests_total
            .with_label_values(&["send", outcome])
            .inc()
    };

    let outcome = match registered(&data, &phone, &ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            counter("unregistered");
            return Err(e);
        }
    };

    match data.otp.send(&outcome.phone).await {
        Ok(true) => {
            counter("sent");
            log_success(&ctx, "otp_send", None);
            Ok(HttpResponse::Ok().json(OtpSentResponse {
                sent: true,
                phone: mask_phone(&outcome.phone),
            }))
        }
        Ok(false) => {
            counter("rejected");
            log_failure(&ctx, "otp_send", "provider did not start a verification");
            Err(ServiceError::external(
                "otp_provider",
                "rejected",
                "verification was not started",
            ))
        }
        Err(e) => {
            counter("error");
            log_failure(&ctx, "otp_send", &e.to_string());
            Err(e.into())
        }
    }
}

pub async fn verify_otp(
    data: web::Data<AppState>,
    req: web::Json<VerifyRequest>,
) -> Result<HttpResponse, ServiceError> {
    let phone = normalize_phone(&req.phone);
    let ctx = LogContext::new(generate_request_id()).with_phone(&phone);
    let counter = |outcome: &str| {
        data.metrics
            .otp_requests_total
            .with_label_values(&["verify", outcome])
            .inc()
    };

    validate_phone(&phone)?;
    let code = req.code.trim();
    if let Err(e) = validate_otp_code(code) {
        log_validation_error(&ctx, "code", &e.to_string());
        return Err(e.into());
    }

    let outcome = registered(&data, &phone, &ctx).await?;
    let organisation_id = outcome.organisation_id.ok_or_else(|| {
        ServiceError::InternalError("lookup found no organisation id".to_string())
    })?;
    let ctx = ctx.with_organisation(organisation_id);

    let approved = match data.otp.verify(&outcome.phone, code).await {
        Ok(approved) => approved,
        Err(e) => {
            counter("error");
            log_failure(&ctx, "otp_verify", &e.to_string());
            return Err(e.into());
        }
    };

    log_auth_attempt(&ctx, approved);
    if !approved {
        counter("rejected");
        return Err(ServiceError::Unauthorized);
    }
    counter("approved");

    let (token, claims) = data.jwt_manager.create_session(
        &outcome.phone,
        organisation_id,
        data.session_ttl_hours,
    )?;

    let expires_at = Utc
        .timestamp_opt(claims.exp as i64, 0)
        .single()
        .ok_or_else(|| ServiceError::InternalError("session expiry out of range".to_string()))?;

    Ok(HttpResponse::Ok().json(SessionResponse {
        token,
        token_type: "Bearer",
        organisation_id,
        expires_at,
    }))
}
