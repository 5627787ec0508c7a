// core/repayment-service/src/models.rs
// Rows read from and written to the loan database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organisation {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub org_phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub borrower_id: Option<Uuid>,
    /// Original principal
    pub loan_amount: Option<f64>,
    /// Annual rate as a decimal fraction (0.24 = 24%)
    pub interest_rate: Option<f64>,
    pub monthly_payment: Option<f64>,
    pub term_months: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub remaining_payments: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Borrower {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nrc_number: Option<String>,
    pub phone: Option<String>,
}

pub const STATUS_COMPLETE: &str = "complete";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Repayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub organisation_id: Uuid,
    pub borrower_id: Option<Uuid>,
    pub payment_amount: f64,
    pub principal_component: f64,
    pub interest_component: f64,
    pub balance: f64,
    pub payment_status: String,
    /// Gateway payment id that produced this row
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRepayment {
    pub loan_id: Uuid,
    pub organisation_id: Uuid,
    pub borrower_id: Option<Uuid>,
    pub payment_amount: f64,
    pub principal_component: f64,
    pub interest_component: f64,
    pub balance: f64,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentMethod {
    /// Flat interest on the original principal
    Simple,
    /// Declining balance
    Amortisation,
}

impl RepaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentMethod::Simple => "simple",
            RepaymentMethod::Amortisation => "amortisation",
        }
    }
}

impl fmt::Display for RepaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(RepaymentMethod::Simple),
            "amortisation" => Ok(RepaymentMethod::Amortisation),
            other => Err(other.to_string()),
        }
    }
}
