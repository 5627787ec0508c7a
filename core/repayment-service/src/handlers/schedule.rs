// core/repayment-service/src/handlers/schedule.rs
// Organisation, schedule and repayment history views

use actix_web::{web, HttpResponse};
use chrono::Utc;
use loanpay_common::{Claims, ServiceError};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::month::MonthKey;
use crate::schedule::{BorrowerPaymentDetail, HistoryEntry};

#[derive(Debug, Serialize)]
pub struct OrganisationResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MonthDetailResponse {
    pub month: MonthKey,
    pub month_display: String,
    pub borrowers: Vec<BorrowerPaymentDetail>,
}

#[derive(Debug, Serialize)]
pub struct HistoryMonth {
    pub month: MonthKey,
    pub month_display: String,
    pub repayments: Vec<HistoryEntry>,
}

pub async fn get_organisation(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, ServiceError> {
    let organisation = data.identity().organisation(claims.organisation_id).await?;

    Ok(HttpResponse::Ok().json(OrganisationResponse {
        id: organisation.id,
        name: organisation.name,
        email: organisation.email,
    }))
}

pub async fn get_schedule(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, ServiceError> {
    let view = data
        .schedule()
        .get_schedule(claims.organisation_id, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(view))
}

pub async fn get_month_detail(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let month: MonthKey = path.into_inner().parse()?;

    let borrowers = data
        .schedule()
        .get_month_detail(claims.organisation_id, month, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(MonthDetailResponse {
        month,
        month_display: month.display_name(),
        borrowers,
    }))
}

/// Most recent month first.
pub async fn get_history(
    data: web::Data<AppState>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, ServiceError> {
    let history = data.schedule().repayment_history(claims.organisation_id).await?;

    let months: Vec<HistoryMonth> = history
        .into_iter()
        .rev()
        .map(|(month, repayments)| HistoryMonth {
            month,
            month_display: month.display_name(),
            repayments,
        })
        .collect();

    Ok(HttpResponse::Ok().json(months))
}
