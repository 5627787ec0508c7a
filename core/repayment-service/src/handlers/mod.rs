// core/repayment-service/src/handlers/mod.rs
// HTTP routes and the state they share

pub mod auth;
pub mod health;
pub mod loans;
pub mod metrics;
pub mod payments;
pub mod schedule;

use actix_web::web;
use loanpay_common::{JwtManager, RepaymentMetrics};
use std::sync::Arc;
use std::time::SystemTime;

use crate::checkout::CheckoutStore;
use crate::gateway::PaymentGateway;
use crate::identity::IdentityService;
use crate::ledger::RepaymentLedger;
use crate::otp::OtpProvider;
use crate::schedule::ScheduleEngine;
use crate::store::LoanStore;

pub struct AppState {
    pub store: Arc<dyn LoanStore>,
    pub otp: Arc<dyn OtpProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub jwt_manager: JwtManager,
    pub checkouts: Arc<CheckoutStore>,
    pub metrics: RepaymentMetrics,
    pub session_ttl_hours: u64,
    pub start_time: SystemTime,
}

impl AppState {
    pub fn identity(&self) -> IdentityService {
        IdentityService::new(self.store.clone())
    }

    pub fn schedule(&self) -> ScheduleEngine {
        ScheduleEngine::new(self.store.clone())
    }

    pub fn ledger(&self) -> RepaymentLedger {
        RepaymentLedger::new(self.store.clone())
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Probes and metrics (no auth)
        .route("/health", web::get().to(health::health_check))
        .route("/liveness", web::get().to(health::liveness_probe))
        .route("/readiness", web::get().to(health::readiness_probe))
        .route("/metrics", web::get().to(metrics::metrics_handler))
        // Sign-in (no auth)
        .route("/auth/lookup", web::post().to(auth::lookup))
        .route("/auth/otp/send", web::post().to(auth::send_otp))
        .route("/auth/otp/verify", web::post().to(auth::verify_otp))
        // Signed-in session
        .route("/organisation", web::get().to(schedule::get_organisation))
        .route("/schedule", web::get().to(schedule::get_schedule))
        .route("/schedule/{month}", web::get().to(schedule::get_month_detail))
        .route("/repayments/history", web::get().to(schedule::get_history))
        .route("/checkout", web::post().to(payments::create_checkout))
        .route("/payments/initiate", web::post().to(payments::initiate_payment))
        .route("/payments/{payment_id}/status", web::get().to(payments::payment_status))
        .route(
            "/loans/{loan_id}/remaining-payments/decrement",
            web::post().to(loans::decrement_remaining_payments),
        )
        .route("/loans/{loan_id}/repayments", web::post().to(loans::record_repayment))
        .route("/loans/{loan_id}/borrower", web::get().to(loans::get_borrower));
}
