// core/repayment-service/src/store/mod.rs
// Storage seam for organisations, loans, borrowers and repayments

pub mod postgres;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use loanpay_common::{DependencyHealth, ServiceError};
use uuid::Uuid;

use crate::models::{Borrower, Loan, NewRepayment, Organisation, Repayment};

pub use postgres::PgLoanStore;

/// Result of writing a settled payment against one loan.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// Row inserted and remaining payments decremented
    Recorded(Repayment),
    /// A row with the same payment reference already existed; nothing written
    AlreadyRecorded(Repayment),
    /// Remaining payments no longer matched the expected value; nothing written
    Conflict,
}

#[async_trait]
pub trait LoanStore: Send + Sync + 'static {
    /// Organisation whose registered numbers contain `phone` (already normalised).
    async fn find_organisation_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Organisation>, ServiceError>;

    async fn get_organisation(&self, id: Uuid) -> Result<Option<Organisation>, ServiceError>;

    async fn loans_for_organisation(&self, organisation_id: Uuid) -> Result<Vec<Loan>, ServiceError>;

    async fn get_loan(&self, loan_id: Uuid) -> Result<Option<Loan>, ServiceError>;

    async fn get_borrower(&self, borrower_id: Uuid) -> Result<Option<Borrower>, ServiceError>;

    async fn borrowers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Borrower>, ServiceError>;

    /// Repayments with status `complete` recorded under the organisation.
    async fn completed_repayments_for_organisation(
        &self,
        organisation_id: Uuid,
    ) -> Result<Vec<Repayment>, ServiceError>;

    /// Every repayment, any status, for the given loans.
    async fn repayments_for_loans(&self, loan_ids: &[Uuid]) -> Result<Vec<Repayment>, ServiceError>;

    /// Raw `method` column of the loan's request record.
    async fn repayment_method(&self, loan_id: Uuid) -> Result<Option<String>, ServiceError>;

    /// Balance carried by the most recent repayment of the loan.
    async fn latest_repayment_balance(&self, loan_id: Uuid) -> Result<Option<f64>, ServiceError>;

    async fn insert_repayment(&self, repayment: NewRepayment) -> Result<Repayment, ServiceError>;

    async fn find_settlement(
        &self,
        loan_id: Uuid,
        payment_reference: &str,
    ) -> Result<Option<Repayment>, ServiceError>;

    /// Insert the repayment and decrement `remaining_payments` from
    /// `expected_remaining` as one unit of work.
    async fn record_settlement(
        &self,
        repayment: NewRepayment,
        expected_remaining: i32,
    ) -> Result<SettlementOutcome, ServiceError>;

    /// Set `remaining_payments = expected - 1` only if it still equals `expected`.
    async fn compare_and_decrement(&self, loan_id: Uuid, expected: i32) -> Result<bool, ServiceError>;

    async fn health(&self) -> DependencyHealth;
}
