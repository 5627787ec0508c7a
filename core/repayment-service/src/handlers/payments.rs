// core/repayment-service/src/handlers/payments.rs
// Checkout, payment initiation and status polling with settlement

use actix_web::{web, HttpResponse};
use chrono::Utc;
use loanpay_common::{generate_request_id, log_failure, log_success, Claims, LogContext, ServiceError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::checkout::{price_checkout, Checkout, PendingPayment};
use crate::gateway::{PaymentRequest, PaymentStatus};
use crate::ledger::LedgerError;
use crate::month::MonthKey;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub loan_ids: Vec<Uuid>,
    pub month: MonthKey,
    #[serde(default)]
    pub transaction_fee: f64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub checkout: Checkout,
    pub month_display: String,
    pub charge_amount: i64,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub payment_id: String,
    pub amount: i64,
    pub month: MonthKey,
    pub loan_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanSettlementOutcome {
    Recorded,
    Duplicate,
    AlreadyComplete,
}

#[derive(Debug, Serialize)]
pub struct LoanSettlement {
    pub loan_id: Uuid,
    pub repayment_id: Option<Uuid>,
    pub outcome: LoanSettlementOutcome,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    #[serde(flatten)]
    pub status: PaymentStatus,
    pub completed: bool,
    pub settlements: Vec<LoanSettlement>,
}

impl PaymentStatusResponse {
    fn new(payment_id: &str, status: PaymentStatus, settlements: Vec<LoanSettlement>) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            completed: status.is_completed(),
            status,
            settlements,
        }
    }
}

pub async fn create_checkout(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    req: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ServiceError> {
    let now = Utc::now();
    let schedules = data
        .schedule()
        .generate_payment_status(claims.organisation_id, now)
        .await?;

    let checkout = price_checkout(
        &schedules,
        claims.organisation_id,
        &req.loan_ids,
        req.month,
        req.transaction_fee,
        now,
    )?;
    data.checkouts.put_checkout(&claims.sid, checkout.clone()).await;

    Ok(HttpResponse::Ok().json(CheckoutResponse {
        month_display: checkout.month.display_name(),
        charge_amount: checkout.charge_amount(),
        checkout,
    }))
}

/// Submit the session's checkout to the gateway. The checkout survives a
/// failed attempt so the client can simply retry.
pub async fn initiate_payment(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, ServiceError> {
    let ctx = LogContext::new(generate_request_id())
        .with_phone(&claims.sub)
        .with_organisation(claims.organisation_id);

    let checkout = data
        .checkouts
        .checkout(&claims.sid)
        .await
        .ok_or_else(|| ServiceError::BadRequest("No checkout in progress".to_string()))?;

    let organisation = data.identity().organisation(claims.organisation_id).await?;
    let request = PaymentRequest::new(
        &organisation.name,
        checkout.month,
        &checkout.loan_ids,
        organisation.email,
        &claims.sub,
        checkout.charge_amount(),
    );

    let payment_id = match data.gateway.initiate(&request).await {
        Ok(id) => id,
        Err(e) => {
            let tag = e.tag();
            data.metrics
                .payments_initiated_total
                .with_label_values(&[tag.as_str()])
                .inc();
            log_failure(&ctx, "payment_initiate", &e.to_string());
            return Err(e.into());
        }
    };

    let pending = data
        .checkouts
        .begin_payment(&claims.sid, &payment_id, Utc::now())
        .await
        .ok_or_else(|| {
            ServiceError::Conflict(format!(
                "Checkout was already submitted; payment {} not tracked",
                payment_id
            ))
        })?;

    data.metrics
        .payments_initiated_total
        .with_label_values(&["success"])
        .inc();
    log_success(&ctx, "payment_initiate", Some(&payment_id));

    Ok(HttpResponse::Ok().json(InitiateResponse {
        payment_id: pending.payment_id,
        amount: request.amount,
        month: pending.checkout.month,
        loan_ids: pending.checkout.loan_ids,
    }))
}

/// Settle every loan of a confirmed payment. Already-recorded loans are
/// reported as duplicates, so a retry after a partial failure finishes the rest.
async fn settle_loans(
    data: &AppState,
    pending: &PendingPayment,
) -> Result<Vec<LoanSettlement>, ServiceError> {
    let ledger = data.ledger();
    let mut settlements = Vec::with_capacity(pending.checkout.loan_ids.len());

    for loan_id in &pending.checkout.loan_ids {
        let settlement = match ledger.settle(*loan_id, &pending.payment_id).await {
            Ok(result) if result.duplicate => {
                data.metrics.duplicate_settlements_total.inc();
                LoanSettlement {
                    loan_id: *loan_id,
                    repayment_id: Some(result.repayment.id),
                    outcome: LoanSettlementOutcome::Duplicate,
                }
            }
            Ok(result) => {
                data.metrics
                    .repayments_recorded_total
                    .with_label_values(&["gateway"])
                    .inc();
                LoanSettlement {
                    loan_id: *loan_id,
                    repayment_id: Some(result.repayment.id),
                    outcome: LoanSettlementOutcome::Recorded,
                }
            }
            Err(LedgerError::AlreadyComplete(_)) => {
                tracing::warn!(
                    loan_id = %loan_id,
                    payment_id = %pending.payment_id,
                    "Payment received for a loan with no remaining payments"
                );
                LoanSettlement {
                    loan_id: *loan_id,
                    repayment_id: None,
                    outcome: LoanSettlementOutcome::AlreadyComplete,
                }
            }
            Err(e) => {
                if matches!(e, LedgerError::Conflict(_)) {
                    data.metrics.settlement_conflicts_total.inc();
                }
                tracing::error!(
                    loan_id = %loan_id,
                    payment_id = %pending.payment_id,
                    error = %e,
                    "Settlement failed"
                );
                return Err(e.into());
            }
        };
        settlements.push(settlement);
    }

    Ok(settlements)
}

pub async fn payment_status(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let payment_id = path.into_inner();
    let not_found = || ServiceError::NotFound(format!("Payment {} not found", payment_id));

    if let Some(settled) = data.checkouts.settled(&payment_id).await {
        if settled.organisation_id != claims.organisation_id {
            return Err(not_found());
        }
        return Ok(HttpResponse::Ok().json(PaymentStatusResponse::new(
            &payment_id,
            PaymentStatus::Success,
            Vec::new(),
        )));
    }

    let pending = data
        .checkouts
        .pending(&payment_id)
        .await
        .filter(|p| p.checkout.organisation_id == claims.organisation_id)
        .ok_or_else(not_found)?;

    let status = data.gateway.poll(&payment_id).await;
    data.metrics
        .payment_polls_total
        .with_label_values(&[status.label()])
        .inc();

    let settlements = match &status {
        PaymentStatus::Success => {
            let settlements = settle_loans(&data, &pending).await?;
            data.checkouts.mark_settled(&payment_id, Utc::now()).await;
            tracing::info!(
                payment_id = %payment_id,
                loans = settlements.len(),
                "Payment settled"
            );
            settlements
        }
        PaymentStatus::Failed { reason } => {
            data.checkouts.restore_checkout(&payment_id).await;
            tracing::warn!(payment_id = %payment_id, reason = %reason, "Payment failed");
            Vec::new()
        }
        PaymentStatus::Pending | PaymentStatus::Error { .. } => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(PaymentStatusResponse::new(&payment_id, status, settlements)))
}
