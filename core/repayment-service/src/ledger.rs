// core/repayment-service/src/ledger.rs
// Interest/principal split, repayment recording and remaining-payment bookkeeping

use loanpay_common::ServiceError;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Loan, NewRepayment, Repayment, RepaymentMethod};
use crate::store::{LoanStore, SettlementOutcome};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Loan {0} not found")]
    LoanNotFound(Uuid),
    #[error("Repayment method not found for loan {0}")]
    MethodNotFound(Uuid),
    #[error("Invalid repayment method '{method}' for loan {loan_id}")]
    InvalidMethod { loan_id: Uuid, method: String },
    #[error("Loan {loan_id} is missing field {field}")]
    MissingField { loan_id: Uuid, field: &'static str },
    #[error("Loan {0} already complete")]
    AlreadyComplete(Uuid),
    #[error("Remaining payments for loan {0} changed concurrently")]
    Conflict(Uuid),
    #[error(transparent)]
    Store(#[from] ServiceError),
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::LoanNotFound(_) | LedgerError::MethodNotFound(_) => {
                ServiceError::NotFound(err.to_string())
            }
            LedgerError::InvalidMethod { .. }
            | LedgerError::MissingField { .. }
            | LedgerError::AlreadyComplete(_) => ServiceError::ValidationError(err.to_string()),
            LedgerError::Conflict(_) => ServiceError::Conflict(err.to_string()),
            LedgerError::Store(inner) => inner,
        }
    }
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RepaymentComponents {
    pub payment_amount: f64,
    pub principal_component: f64,
    pub interest_component: f64,
    pub new_balance: f64,
}

/// Split one monthly payment into interest and principal.
///
/// `latest_balance` is the balance of the most recent repayment; without one the
/// original principal is the basis. `simple` charges interest on the original
/// principal every month, `amortisation` on the declining basis. Both report the
/// outstanding principal as the new balance.
pub fn calculate_components(
    loan_amount: f64,
    monthly_payment: f64,
    annual_interest_rate: f64,
    method: RepaymentMethod,
    latest_balance: Option<f64>,
) -> RepaymentComponents {
    let monthly_rate = annual_interest_rate / 12.0;
    let basis = latest_balance.unwrap_or(loan_amount);

    let interest_component = match method {
        RepaymentMethod::Simple => round2(loan_amount * monthly_rate),
        RepaymentMethod::Amortisation => round2(basis * monthly_rate),
    };
    let principal_component = round2(monthly_payment - interest_component);
    let new_balance = round2(basis - principal_component);

    RepaymentComponents {
        payment_amount: round2(monthly_payment),
        principal_component,
        interest_component,
        new_balance,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub repayment: Repayment,
    /// The payment had already been recorded; nothing was written this time
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterUpdate {
    pub loan_id: Uuid,
    pub remaining_payments: i32,
}

pub struct RepaymentLedger {
    store: Arc<dyn LoanStore>,
}

impl RepaymentLedger {
    pub fn new(store: Arc<dyn LoanStore>) -> Self {
        Self { store }
    }

    async fn load_loan(&self, loan_id: Uuid) -> Result<Loan, LedgerError> {
        self.store
            .get_loan(loan_id)
            .await?
            .ok_or(LedgerError::LoanNotFound(loan_id))
    }

    /// Compute the next repayment row for a loan without writing it.
    pub async fn next_repayment(
        &self,
        loan: &Loan,
        payment_reference: Option<String>,
    ) -> Result<NewRepayment, LedgerError> {
        let raw_method = self
            .store
            .repayment_method(loan.id)
            .await?
            .ok_or(LedgerError::MethodNotFound(loan.id))?;
        let method: RepaymentMethod =
            raw_method
                .parse()
                .map_err(|method| LedgerError::InvalidMethod {
                    loan_id: loan.id,
                    method,
                })?;

        let missing = |field| LedgerError::MissingField {
            loan_id: loan.id,
            field,
        };
        let loan_amount = loan.loan_amount.ok_or_else(|| missing("loan_amount"))?;
        let monthly_payment = loan.monthly_payment.ok_or_else(|| missing("monthly_payment"))?;
        let interest_rate = loan.interest_rate.ok_or_else(|| missing("interest_rate"))?;

        let latest_balance = self.store.latest_repayment_balance(loan.id).await?;
        let components = calculate_components(
            loan_amount,
            monthly_payment,
            interest_rate,
            method,
            latest_balance,
        );

        if components.new_balance < 0.0 {
            tracing::warn!(
                loan_id = %loan.id,
                method = %method,
                balance = components.new_balance,
                "Repayment leaves a negative balance"
            );
        }

        Ok(NewRepayment {
            loan_id: loan.id,
            organisation_id: loan.organisation_id,
            borrower_id: loan.borrower_id,
            payment_amount: components.payment_amount,
            principal_component: components.principal_component,
            interest_component: components.interest_component,
            balance: components.new_balance,
            payment_reference,
        })
    }

    /// Append one completed repayment for the loan. The counter is left untouched.
    pub async fn record_repayment(&self, loan_id: Uuid) -> Result<Repayment, LedgerError> {
        let loan = self.load_loan(loan_id).await?;
        let repayment = self.next_repayment(&loan, None).await?;
        let row = self.store.insert_repayment(repayment).await?;

        tracing::info!(loan_id = %loan_id, repayment_id = %row.id, "Repayment recorded");
        Ok(row)
    }

    /// Decrement `remaining_payments` by one with a compare-and-swap.
    pub async fn decrement_counter(&self, loan_id: Uuid) -> Result<CounterUpdate, LedgerError> {
        let loan = self.load_loan(loan_id).await?;
        let remaining = loan.remaining_payments.ok_or(LedgerError::MissingField {
            loan_id,
            field: "remaining_payments",
        })?;

        if remaining <= 0 {
            return Err(LedgerError::AlreadyComplete(loan_id));
        }

        if !self.store.compare_and_decrement(loan_id, remaining).await? {
            return Err(LedgerError::Conflict(loan_id));
        }

        Ok(CounterUpdate {
            loan_id,
            remaining_payments: remaining - 1,
        })
    }

    /// Record a confirmed gateway payment against one loan.
    ///
    /// Writing the repayment and decrementing the counter happen together.
    /// Settling the same `(loan_id, payment_reference)` again returns the
    /// existing row and writes nothing.
    pub async fn settle(
        &self,
        loan_id: Uuid,
        payment_reference: &str,
    ) -> Result<SettlementResult, LedgerError> {
        if let Some(existing) = self.store.find_settlement(loan_id, payment_reference).await? {
            return Ok(SettlementResult {
                repayment: existing,
                duplicate: true,
            });
        }

        let loan = self.load_loan(loan_id).await?;
        let remaining = loan.remaining_payments.ok_or(LedgerError::MissingField {
            loan_id,
            field: "remaining_payments",
        })?;
        if remaining <= 0 {
            return Err(LedgerError::AlreadyComplete(loan_id));
        }

        let repayment = self
            .next_repayment(&loan, Some(payment_reference.to_string()))
            .await?;

        match self.store.record_settlement(repayment, remaining).await? {
            SettlementOutcome::Recorded(row) => {
                tracing::info!(
                    loan_id = %loan_id,
                    repayment_id = %row.id,
                    payment_reference = payment_reference,
                    remaining_payments = remaining - 1,
                    "Payment settled"
                );
                Ok(SettlementResult {
                    repayment: row,
                    duplicate: false,
                })
            }
            SettlementOutcome::AlreadyRecorded(row) => Ok(SettlementResult {
                repayment: row,
                duplicate: true,
            }),
            SettlementOutcome::Conflict => {
                // A concurrent poll may have settled this very payment
                match self.store.find_settlement(loan_id, payment_reference).await? {
                    Some(row) => Ok(SettlementResult {
                        repayment: row,
                        duplicate: true,
                    }),
                    None => Err(LedgerError::Conflict(loan_id)),
                }
            }
        }
    }
}
