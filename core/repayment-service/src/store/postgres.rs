// core/repayment-service/src/store/postgres.rs
// PostgreSQL implementation of the loan store

use async_trait::async_trait;
use loanpay_common::{check_database_health, DependencyHealth, ServiceError};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LoanStore, SettlementOutcome};
use crate::models::{Borrower, Loan, NewRepayment, Organisation, Repayment, STATUS_COMPLETE};

const ORGANISATION_COLUMNS: &str = "id, name, email, org_phone_numbers";

const LOAN_COLUMNS: &str = "id, organisation_id, borrower_id, loan_amount, interest_rate, \
     monthly_payment, term_months, created_at, remaining_payments";

const REPAYMENT_COLUMNS: &str = "id, loan_id, organisation_id, borrower_id, payment_amount, \
     principal_component, interest_component, balance, payment_status, payment_reference, created_at";

#[derive(Clone)]
pub struct PgLoanStore {
    pool: PgPool,
}

impl PgLoanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_REPAYMENT: &str = r#"
    INSERT INTO loan_repayments (
        id, loan_id, organisation_id, borrower_id, payment_amount,
        principal_component, interest_component, balance, payment_status,
        payment_reference, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
    RETURNING id, loan_id, organisation_id, borrower_id, payment_amount,
        principal_component, interest_component, balance, payment_status,
        payment_reference, created_at
"#;

fn bind_new_repayment<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Repayment, sqlx::postgres::PgArguments>,
    repayment: &'q NewRepayment,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Repayment, sqlx::postgres::PgArguments> {
    query
        .bind(Uuid::new_v4())
        .bind(repayment.loan_id)
        .bind(repayment.organisation_id)
        .bind(repayment.borrower_id)
        .bind(repayment.payment_amount)
        .bind(repayment.principal_component)
        .bind(repayment.interest_component)
        .bind(repayment.balance)
        .bind(STATUS_COMPLETE)
        .bind(repayment.payment_reference.as_deref())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl LoanStore for PgLoanStore {
    async fn find_organisation_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Organisation>, ServiceError> {
        let organisation = sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {} FROM organisations WHERE org_phone_numbers @> ARRAY[$1]::text[] LIMIT 1",
            ORGANISATION_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(organisation)
    }

    async fn get_organisation(&self, id: Uuid) -> Result<Option<Organisation>, ServiceError> {
        let organisation = sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {} FROM organisations WHERE id = $1",
            ORGANISATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(organisation)
    }

    async fn loans_for_organisation(&self, organisation_id: Uuid) -> Result<Vec<Loan>, ServiceError> {
        let loans = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE organisation_id = $1 ORDER BY created_at",
            LOAN_COLUMNS
        ))
        .bind(organisation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn get_loan(&self, loan_id: Uuid) -> Result<Option<Loan>, ServiceError> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    async fn get_borrower(&self, borrower_id: Uuid) -> Result<Option<Borrower>, ServiceError> {
        let borrower = sqlx::query_as::<_, Borrower>(
            "SELECT id, first_name, last_name, nrc_number, phone FROM borrowers WHERE id = $1",
        )
        .bind(borrower_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(borrower)
    }

    async fn borrowers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Borrower>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let borrowers = sqlx::query_as::<_, Borrower>(
            "SELECT id, first_name, last_name, nrc_number, phone FROM borrowers WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(borrowers)
    }

    async fn completed_repayments_for_organisation(
        &self,
        organisation_id: Uuid,
    ) -> Result<Vec<Repayment>, ServiceError> {
        let repayments = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM loan_repayments \
             WHERE organisation_id = $1 AND payment_status = $2 \
             ORDER BY created_at",
            REPAYMENT_COLUMNS
        ))
        .bind(organisation_id)
        .bind(STATUS_COMPLETE)
        .fetch_all(&self.pool)
        .await?;

        Ok(repayments)
    }

    async fn repayments_for_loans(&self, loan_ids: &[Uuid]) -> Result<Vec<Repayment>, ServiceError> {
        if loan_ids.is_empty() {
            return Ok(Vec::new());
        }

        let repayments = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM loan_repayments WHERE loan_id = ANY($1) ORDER BY created_at",
            REPAYMENT_COLUMNS
        ))
        .bind(loan_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(repayments)
    }

    async fn repayment_method(&self, loan_id: Uuid) -> Result<Option<String>, ServiceError> {
        let method = sqlx::query_scalar::<_, Option<String>>(
            "SELECT method FROM loan_requests WHERE id = $1",
        )
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method.flatten())
    }

    async fn latest_repayment_balance(&self, loan_id: Uuid) -> Result<Option<f64>, ServiceError> {
        let balance = sqlx::query_scalar::<_, f64>(
            "SELECT balance FROM loan_repayments WHERE loan_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn insert_repayment(&self, repayment: NewRepayment) -> Result<Repayment, ServiceError> {
        let row = bind_new_repayment(sqlx::query_as::<_, Repayment>(INSERT_REPAYMENT), &repayment)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_settlement(
        &self,
        loan_id: Uuid,
        payment_reference: &str,
    ) -> Result<Option<Repayment>, ServiceError> {
        let repayment = sqlx::query_as::<_, Repayment>(&format!(
            "SELECT {} FROM loan_repayments WHERE loan_id = $1 AND payment_reference = $2",
            REPAYMENT_COLUMNS
        ))
        .bind(loan_id)
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(repayment)
    }

    async fn record_settlement(
        &self,
        repayment: NewRepayment,
        expected_remaining: i32,
    ) -> Result<SettlementOutcome, ServiceError> {
        let mut tx = self.pool.begin().await?;

        if let Some(reference) = repayment.payment_reference.as_deref() {
            let existing = sqlx::query_as::<_, Repayment>(&format!(
                "SELECT {} FROM loan_repayments WHERE loan_id = $1 AND payment_reference = $2",
                REPAYMENT_COLUMNS
            ))
            .bind(repayment.loan_id)
            .bind(reference)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                tx.rollback().await?;
                return Ok(SettlementOutcome::AlreadyRecorded(existing));
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE loans
            SET remaining_payments = remaining_payments - 1
            WHERE id = $1 AND remaining_payments = $2 AND remaining_payments > 0
            "#,
        )
        .bind(repayment.loan_id)
        .bind(expected_remaining)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SettlementOutcome::Conflict);
        }

        let inserted = bind_new_repayment(sqlx::query_as::<_, Repayment>(INSERT_REPAYMENT), &repayment)
            .fetch_one(&mut *tx)
            .await;

        match inserted {
            Ok(row) => {
                tx.commit().await?;
                Ok(SettlementOutcome::Recorded(row))
            }
            // Concurrent settlement of the same payment won the unique index
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                match repayment.payment_reference.as_deref() {
                    Some(reference) => match self.find_settlement(repayment.loan_id, reference).await? {
                        Some(existing) => Ok(SettlementOutcome::AlreadyRecorded(existing)),
                        None => Ok(SettlementOutcome::Conflict),
                    },
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn compare_and_decrement(&self, loan_id: Uuid, expected: i32) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET remaining_payments = $2 - 1
            WHERE id = $1 AND remaining_payments = $2
            "#,
        )
        .bind(loan_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health(&self) -> DependencyHealth {
        check_database_health(&self.pool).await
    }
}
