// core/repayment-service/src/checkout.rs
// Per-session checkouts and in-flight gateway payments

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use loanpay_common::{validate_amount, validate_fee, ServiceError, ValidationError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ledger::round2;
use crate::month::MonthKey;
use crate::schedule::{LoanSchedule, MonthStatus};

const MAX_CHECKOUT_LOANS: usize = 100;

/// Loans selected for payment in one month, priced from the schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkout {
    pub organisation_id: Uuid,
    pub loan_ids: Vec<Uuid>,
    pub month: MonthKey,
    pub total_amount: f64,
    pub transaction_fee: f64,
    pub created_at: DateTime<Utc>,
}

impl Checkout {
    /// Whole currency units sent to the gateway.
    pub fn charge_amount(&self) -> i64 {
        (self.total_amount + self.transaction_fee).trunc() as i64
    }
}

/// Price a checkout against the organisation's current schedule.
///
/// Every loan must be Upcoming in `month`. Duplicate ids are collapsed and
/// the selection order is kept.
pub fn price_checkout(
    schedules: &[LoanSchedule],
    organisation_id: Uuid,
    loan_ids: &[Uuid],
    month: MonthKey,
    transaction_fee: f64,
    now: DateTime<Utc>,
) -> Result<Checkout, ServiceError> {
    if loan_ids.is_empty() {
        return Err(ValidationError::MissingField("loan_ids".to_string()).into());
    }
    if loan_ids.len() > MAX_CHECKOUT_LOANS {
        return Err(ServiceError::ValidationError(format!(
            "at most {} loans can be paid at once",
            MAX_CHECKOUT_LOANS
        )));
    }
    validate_fee(transaction_fee)?;

    let by_id: HashMap<Uuid, &LoanSchedule> = schedules.iter().map(|s| (s.loan_id, s)).collect();

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut total = 0.0;

    for loan_id in loan_ids {
        if !seen.insert(*loan_id) {
            continue;
        }

        let schedule = by_id
            .get(loan_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Loan {} not found", loan_id)))?;

        if schedule.payment_status_by_month.get(&month) != Some(&MonthStatus::Upcoming) {
            return Err(ServiceError::ValidationError(format!(
                "Loan {} has no upcoming payment in {}",
                loan_id, month
            )));
        }

        total += schedule.monthly_payment.unwrap_or(0.0);
        selected.push(*loan_id);
    }

    let total_amount = round2(total);
    validate_amount(total_amount)?;

    Ok(Checkout {
        organisation_id,
        loan_ids: selected,
        month,
        total_amount,
        transaction_fee: round2(transaction_fee),
        created_at: now,
    })
}

/// A checkout handed to the gateway and awaiting settlement.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayment {
    pub payment_id: String,
    pub session_id: String,
    pub checkout: Checkout,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettledPayment {
    pub payment_id: String,
    pub organisation_id: Uuid,
    pub loan_ids: Vec<Uuid>,
    pub settled_at: DateTime<Utc>,
}

/// In-process session state: one checkout per session id, pending payments
/// by gateway payment id and a short memory of settled payments.
#[derive(Default)]
pub struct CheckoutStore {
    checkouts: RwLock<HashMap<String, Checkout>>,
    pending: RwLock<HashMap<String, PendingPayment>>,
    settled: RwLock<HashMap<String, SettledPayment>>,
}

impl CheckoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_checkout(&self, session_id: &str, checkout: Checkout) {
        self.checkouts
            .write()
            .await
            .insert(session_id.to_string(), checkout);
    }

    pub async fn checkout(&self, session_id: &str) -> Option<Checkout> {
        self.checkouts.read().await.get(session_id).cloned()
    }

    /// Convert the session's checkout into a pending payment.
    pub async fn begin_payment(
        &self,
        session_id: &str,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Option<PendingPayment> {
        let checkout = self.checkouts.write().await.remove(session_id)?;

        let pending = PendingPayment {
            payment_id: payment_id.to_string(),
            session_id: session_id.to_string(),
            checkout,
            initiated_at: now,
        };
        self.pending
            .write()
            .await
            .insert(payment_id.to_string(), pending.clone());

        Some(pending)
    }

    pub async fn pending(&self, payment_id: &str) -> Option<PendingPayment> {
        self.pending.read().await.get(payment_id).cloned()
    }

    pub async fn settled(&self, payment_id: &str) -> Option<SettledPayment> {
        self.settled.read().await.get(payment_id).cloned()
    }

    pub async fn mark_settled(&self, payment_id: &str, now: DateTime<Utc>) -> Option<SettledPayment> {
        let pending = self.pending.write().await.remove(payment_id)?;

        let settled = SettledPayment {
            payment_id: pending.payment_id,
            organisation_id: pending.checkout.organisation_id,
            loan_ids: pending.checkout.loan_ids,
            settled_at: now,
        };
        self.settled
            .write()
            .await
            .insert(payment_id.to_string(), settled.clone());

        Some(settled)
    }

    /// Put a failed payment's checkout back so the session can pay again.
    /// A newer checkout for the same session is not overwritten.
    pub async fn restore_checkout(&self, payment_id: &str) -> Option<Checkout> {
        let pending = self.pending.write().await.remove(payment_id)?;

        let mut checkouts = self.checkouts.write().await;
        let checkout = checkouts
            .entry(pending.session_id)
            .or_insert(pending.checkout);
        Some(checkout.clone())
    }

    /// Drop everything older than `max_age`; returns how many entries went.
    pub async fn purge_older_than(&self, max_age: ChronoDuration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let mut removed = 0;

        {
            let mut checkouts = self.checkouts.write().await;
            let before = checkouts.len();
            checkouts.retain(|_, c| c.created_at > cutoff);
            removed += before - checkouts.len();
        }
        {
            let mut pending = self.pending.write().await;
            let before = pending.len();
            pending.retain(|_, p| p.initiated_at > cutoff);
            removed += before - pending.len();
        }
        {
            let mut settled = self.settled.write().await;
            let before = settled.len();
            settled.retain(|_, s| s.settled_at > cutoff);
            removed += before - settled.len();
        }

        removed
    }
}

/// Start background purge of stale checkouts and payments
pub fn start_purge_task(store: Arc<CheckoutStore>, max_age: ChronoDuration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let removed = store.purge_older_than(max_age, Utc::now()).await;
            if removed > 0 {
                tracing::debug!(removed = removed, "Purged stale checkout state");
            }
        }
    });
}
