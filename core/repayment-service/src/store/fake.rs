// core/repayment-service/src/store/fake.rs
// In-memory loan store for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loanpay_common::{DependencyHealth, HealthStatus, ServiceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{LoanStore, SettlementOutcome};
use crate::models::{Borrower, Loan, NewRepayment, Organisation, Repayment, STATUS_COMPLETE};

#[derive(Default)]
struct Tables {
    organisations: Vec<Organisation>,
    loans: Vec<Loan>,
    borrowers: Vec<Borrower>,
    repayments: Vec<Repayment>,
    methods: HashMap<Uuid, Option<String>>,
}

pub struct FakeStore {
    tables: Mutex<Tables>,
    pub insert_calls: AtomicU64,
    /// When set, the next compare-and-swap loses as if another writer got there first
    pub lose_next_cas: AtomicBool,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            insert_calls: AtomicU64::new(0),
            lose_next_cas: AtomicBool::new(false),
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_organisation(&self, organisation: Organisation) {
        self.tables.lock().await.organisations.push(organisation);
    }

    pub async fn add_loan(&self, loan: Loan, method: Option<&str>) {
        let mut tables = self.tables.lock().await;
        tables.methods.insert(loan.id, method.map(str::to_string));
        tables.loans.push(loan);
    }

    pub async fn add_loan_without_method(&self, loan: Loan) {
        self.tables.lock().await.loans.push(loan);
    }

    pub async fn set_method(&self, loan_id: Uuid, method: &str) {
        self.tables
            .lock()
            .await
            .methods
            .insert(loan_id, Some(method.to_string()));
    }

    pub async fn add_borrower(&self, borrower: Borrower) {
        self.tables.lock().await.borrowers.push(borrower);
    }

    pub async fn add_repayment(&self, repayment: Repayment) {
        self.tables.lock().await.repayments.push(repayment);
    }

    pub async fn repayments(&self) -> Vec<Repayment> {
        self.tables.lock().await.repayments.clone()
    }

    pub async fn remaining_payments(&self, loan_id: Uuid) -> Option<i32> {
        self.tables
            .lock()
            .await
            .loans
            .iter()
            .find(|l| l.id == loan_id)
            .and_then(|l| l.remaining_payments)
    }

    fn build_row(repayment: NewRepayment, created_at: DateTime<Utc>) -> Repayment {
        Repayment {
            id: Uuid::new_v4(),
            loan_id: repayment.loan_id,
            organisation_id: repayment.organisation_id,
            borrower_id: repayment.borrower_id,
            payment_amount: repayment.payment_amount,
            principal_component: repayment.principal_component,
            interest_component: repayment.interest_component,
            balance: repayment.balance,
            payment_status: STATUS_COMPLETE.to_string(),
            payment_reference: repayment.payment_reference,
            created_at,
        }
    }

    fn take_lost_cas(&self) -> bool {
        self.lose_next_cas.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl LoanStore for FakeStore {
    async fn find_organisation_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Organisation>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .organisations
            .iter()
            .find(|o| o.org_phone_numbers.iter().any(|n| n == phone))
            .cloned())
    }

    async fn get_organisation(&self, id: Uuid) -> Result<Option<Organisation>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables.organisations.iter().find(|o| o.id == id).cloned())
    }

    async fn loans_for_organisation(&self, organisation_id: Uuid) -> Result<Vec<Loan>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .loans
            .iter()
            .filter(|l| l.organisation_id == organisation_id)
            .cloned()
            .collect())
    }

    async fn get_loan(&self, loan_id: Uuid) -> Result<Option<Loan>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables.loans.iter().find(|l| l.id == loan_id).cloned())
    }

    async fn get_borrower(&self, borrower_id: Uuid) -> Result<Option<Borrower>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables.borrowers.iter().find(|b| b.id == borrower_id).cloned())
    }

    async fn borrowers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Borrower>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .borrowers
            .iter()
            .filter(|b| ids.contains(&b.id))
            .cloned()
            .collect())
    }

    async fn completed_repayments_for_organisation(
        &self,
        organisation_id: Uuid,
    ) -> Result<Vec<Repayment>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .repayments
            .iter()
            .filter(|r| r.organisation_id == organisation_id && r.payment_status == STATUS_COMPLETE)
            .cloned()
            .collect())
    }

    async fn repayments_for_loans(&self, loan_ids: &[Uuid]) -> Result<Vec<Repayment>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .repayments
            .iter()
            .filter(|r| loan_ids.contains(&r.loan_id))
            .cloned()
            .collect())
    }

    async fn repayment_method(&self, loan_id: Uuid) -> Result<Option<String>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables.methods.get(&loan_id).cloned().flatten())
    }

    async fn latest_repayment_balance(&self, loan_id: Uuid) -> Result<Option<f64>, ServiceError> {
        let tables = self.tables.lock().await;
        // Later pushes win ties, matching insertion order
        Ok(tables
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .fold(None::<&Repayment>, |latest, r| match latest {
                Some(l) if l.created_at > r.created_at => Some(l),
                _ => Some(r),
            })
            .map(|r| r.balance))
    }

    async fn insert_repayment(&self, repayment: NewRepayment) -> Result<Repayment, ServiceError> {
        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let row = Self::build_row(repayment, now);
        self.tables.lock().await.repayments.push(row.clone());
        Ok(row)
    }

    async fn find_settlement(
        &self,
        loan_id: Uuid,
        payment_reference: &str,
    ) -> Result<Option<Repayment>, ServiceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .repayments
            .iter()
            .find(|r| r.loan_id == loan_id && r.payment_reference.as_deref() == Some(payment_reference))
            .cloned())
    }

    async fn record_settlement(
        &self,
        repayment: NewRepayment,
        expected_remaining: i32,
    ) -> Result<SettlementOutcome, ServiceError> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        if let Some(reference) = repayment.payment_reference.as_deref() {
            if let Some(existing) = tables.repayments.iter().find(|r| {
                r.loan_id == repayment.loan_id && r.payment_reference.as_deref() == Some(reference)
            }) {
                return Ok(SettlementOutcome::AlreadyRecorded(existing.clone()));
            }
        }

        if self.take_lost_cas() {
            return Ok(SettlementOutcome::Conflict);
        }

        let Some(loan) = tables.loans.iter_mut().find(|l| l.id == repayment.loan_id) else {
            return Ok(SettlementOutcome::Conflict);
        };
        match loan.remaining_payments {
            Some(current) if current == expected_remaining && current > 0 => {
                loan.remaining_payments = Some(current - 1);
            }
            _ => return Ok(SettlementOutcome::Conflict),
        }

        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        let row = Self::build_row(repayment, now);
        tables.repayments.push(row.clone());
        Ok(SettlementOutcome::Recorded(row))
    }

    async fn compare_and_decrement(&self, loan_id: Uuid, expected: i32) -> Result<bool, ServiceError> {
        if self.take_lost_cas() {
            return Ok(false);
        }

        let mut tables = self.tables.lock().await;
        match tables.loans.iter_mut().find(|l| l.id == loan_id) {
            Some(loan) if loan.remaining_payments == Some(expected) => {
                loan.remaining_payments = Some(expected - 1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health(&self) -> DependencyHealth {
        DependencyHealth::new("database", HealthStatus::Healthy).with_latency(0)
    }
}
