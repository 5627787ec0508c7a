// core/repayment-service/src/handlers/loans.rs
// Loan-scoped operations: counter decrement, manual repayment, borrower lookup

use actix_web::{web, HttpResponse};
use loanpay_common::{Claims, ServiceError};
use uuid::Uuid;

use super::AppState;
use crate::models::Loan;

/// The loan, provided it belongs to the signed-in organisation.
async fn owned_loan(data: &AppState, claims: &Claims, loan_id: Uuid) -> Result<Loan, ServiceError> {
    data.store
        .get_loan(loan_id)
        .await?
        .filter(|loan| loan.organisation_id == claims.organisation_id)
        .ok_or_else(|| ServiceError::NotFound(format!("Loan {} not found", loan_id)))
}

pub async fn decrement_remaining_payments(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let loan = owned_loan(&data, &claims, path.into_inner()).await?;

    let update = data.ledger().decrement_counter(loan.id).await.map_err(|e| {
        tracing::warn!(loan_id = %loan.id, error = %e, "Remaining payments not decremented");
        ServiceError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(update))
}

/// Record a repayment collected outside the gateway. The remaining-payment
/// counter is left for the caller to decrement.
pub async fn record_repayment(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let loan = owned_loan(&data, &claims, path.into_inner()).await?;

    let repayment = data.ledger().record_repayment(loan.id).await?;
    data.metrics
        .repayments_recorded_total
        .with_label_values(&["manual"])
        .inc();

    Ok(HttpResponse::Created().json(repayment))
}

pub async fn get_borrower(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let loan = owned_loan(&data, &claims, path.into_inner()).await?;
    let missing = || ServiceError::NotFound(format!("No borrower recorded for loan {}", loan.id));

    let borrower_id = loan.borrower_id.ok_or_else(missing)?;
    let borrower = data
        .store
        .get_borrower(borrower_id)
        .await?
        .ok_or_else(missing)?;

    Ok(HttpResponse::Ok().json(borrower))
}
