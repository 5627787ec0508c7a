// core/repayment-service/src/schedule.rs
// Month-by-month repayment schedule derived from loans and completed repayments

use chrono::{DateTime, Utc};
use loanpay_common::ServiceError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Loan, Repayment};
use crate::month::{add_months, MonthKey};
use crate::store::LoanStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonthStatus {
    Paid,
    Upcoming,
    Missed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanSchedule {
    pub loan_id: Uuid,
    pub monthly_payment: Option<f64>,
    pub borrower_id: Option<Uuid>,
    pub organisation_id: Uuid,
    pub payment_status_by_month: BTreeMap<MonthKey, MonthStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledLoan {
    pub loan_id: Uuid,
    pub monthly_payment: f64,
    pub borrower_id: Option<Uuid>,
    pub status: MonthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    pub month: MonthKey,
    pub month_display: String,
    pub total_amount: f64,
    pub loan_count: usize,
    pub loans: Vec<ScheduledLoan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub months_with_payments: Vec<MonthSummary>,
    pub has_upcoming_payments: bool,
    pub total_upcoming_months: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BorrowerPaymentDetail {
    pub loan_id: Uuid,
    pub borrower_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nrc_number: Option<String>,
    pub phone_number: Option<String>,
    pub monthly_payment: Option<f64>,
    pub payment_status: MonthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub loan_id: Uuid,
    pub borrower_id: Option<Uuid>,
    pub organisation_id: Uuid,
    pub payment_amount: f64,
    pub principal_component: f64,
    pub interest_component: f64,
    pub balance: f64,
    pub payment_status: String,
    pub monthly_payment: Option<f64>,
    pub term_months: Option<i32>,
}

/// Calendar months in which each loan received a completed repayment.
pub fn paid_months_by_loan(repayments: &[Repayment]) -> HashMap<Uuid, HashSet<MonthKey>> {
    let mut paid: HashMap<Uuid, HashSet<MonthKey>> = HashMap::new();
    for repayment in repayments {
        paid.entry(repayment.loan_id)
            .or_default()
            .insert(MonthKey::from_date(&repayment.created_at));
    }
    paid
}

/// Status of every due month of one loan.
///
/// Due dates start one calendar month after creation. A due date after `now` is
/// Upcoming; otherwise the month is Paid when a completed repayment landed in it
/// and Missed when none did.
pub fn loan_schedule(
    loan: &Loan,
    paid_months: Option<&HashSet<MonthKey>>,
    now: DateTime<Utc>,
) -> BTreeMap<MonthKey, MonthStatus> {
    let term = loan.term_months.unwrap_or(0).max(0) as u32;
    let mut statuses = BTreeMap::new();

    // Each due date steps from the first one, so an end-of-month clamp carries forward
    let Some(start) = add_months(loan.created_at, 1) else {
        return statuses;
    };

    for i in 0..term {
        let Some(due) = add_months(start, i) else {
            break;
        };
        let month = MonthKey::from_date(&due);

        let status = if due > now {
            MonthStatus::Upcoming
        } else if paid_months.is_some_and(|paid| paid.contains(&month)) {
            MonthStatus::Paid
        } else {
            MonthStatus::Missed
        };

        statuses.insert(month, status);
    }

    statuses
}

/// Group every Upcoming entry by month, ascending.
pub fn aggregate_upcoming(schedules: &[LoanSchedule]) -> ScheduleView {
    let mut months: BTreeMap<MonthKey, MonthSummary> = BTreeMap::new();

    for schedule in schedules {
        for (month, status) in &schedule.payment_status_by_month {
            if *status != MonthStatus::Upcoming {
                continue;
            }

            let monthly_payment = schedule.monthly_payment.unwrap_or(0.0);
            let summary = months.entry(*month).or_insert_with(|| MonthSummary {
                month: *month,
                month_display: month.display_name(),
                total_amount: 0.0,
                loan_count: 0,
                loans: Vec::new(),
            });

            summary.total_amount += monthly_payment;
            summary.loan_count += 1;
            summary.loans.push(ScheduledLoan {
                loan_id: schedule.loan_id,
                monthly_payment,
                borrower_id: schedule.borrower_id,
                status: *status,
            });
        }
    }

    let months_with_payments: Vec<MonthSummary> = months.into_values().collect();
    ScheduleView {
        has_upcoming_payments: !months_with_payments.is_empty(),
        total_upcoming_months: months_with_payments.len(),
        months_with_payments,
    }
}

pub struct ScheduleEngine {
    store: Arc<dyn LoanStore>,
}

impl ScheduleEngine {
    pub fn new(store: Arc<dyn LoanStore>) -> Self {
        Self { store }
    }

    pub async fn generate_payment_status(
        &self,
        organisation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<LoanSchedule>, ServiceError> {
        let loans = self.store.loans_for_organisation(organisation_id).await?;
        if loans.is_empty() {
            return Ok(Vec::new());
        }

        let repayments = self
            .store
            .completed_repayments_for_organisation(organisation_id)
            .await?;
        let paid = paid_months_by_loan(&repayments);

        Ok(loans
            .iter()
            .map(|loan| LoanSchedule {
                loan_id: loan.id,
                monthly_payment: loan.monthly_payment,
                borrower_id: loan.borrower_id,
                organisation_id,
                payment_status_by_month: loan_schedule(loan, paid.get(&loan.id), now),
            })
            .collect())
    }

    pub async fn get_schedule(
        &self,
        organisation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduleView, ServiceError> {
        let schedules = self.generate_payment_status(organisation_id, now).await?;
        Ok(aggregate_upcoming(&schedules))
    }

    /// Borrowers with an Upcoming payment in `month`. Loans without a known
    /// borrower are left out.
    pub async fn get_month_detail(
        &self,
        organisation_id: Uuid,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<BorrowerPaymentDetail>, ServiceError> {
        let schedules = self.generate_payment_status(organisation_id, now).await?;

        let due: Vec<&LoanSchedule> = schedules
            .iter()
            .filter(|s| s.payment_status_by_month.get(&month) == Some(&MonthStatus::Upcoming))
            .collect();

        let mut borrower_ids: Vec<Uuid> = due.iter().filter_map(|s| s.borrower_id).collect();
        borrower_ids.sort();
        borrower_ids.dedup();
        if borrower_ids.is_empty() {
            return Ok(Vec::new());
        }

        let borrowers: HashMap<Uuid, _> = self
            .store
            .borrowers_by_ids(&borrower_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        Ok(due
            .into_iter()
            .filter_map(|schedule| {
                let borrower = borrowers.get(&schedule.borrower_id?)?;
                Some(BorrowerPaymentDetail {
                    loan_id: schedule.loan_id,
                    borrower_id: borrower.id,
                    first_name: borrower.first_name.clone(),
                    last_name: borrower.last_name.clone(),
                    nrc_number: borrower.nrc_number.clone(),
                    phone_number: borrower.phone.clone(),
                    monthly_payment: schedule.monthly_payment,
                    payment_status: MonthStatus::Upcoming,
                })
            })
            .collect())
    }

    /// Every repayment of the organisation's loans grouped by the month it was recorded.
    pub async fn repayment_history(
        &self,
        organisation_id: Uuid,
    ) -> Result<BTreeMap<MonthKey, Vec<HistoryEntry>>, ServiceError> {
        let loans = self.store.loans_for_organisation(organisation_id).await?;
        if loans.is_empty() {
            return Ok(BTreeMap::new());
        }

        let loan_ids: Vec<Uuid> = loans.iter().map(|l| l.id).collect();
        let by_id: HashMap<Uuid, &Loan> = loans.iter().map(|l| (l.id, l)).collect();
        let repayments = self.store.repayments_for_loans(&loan_ids).await?;

        let mut history: BTreeMap<MonthKey, Vec<HistoryEntry>> = BTreeMap::new();
        for repayment in repayments {
            let Some(loan) = by_id.get(&repayment.loan_id) else {
                continue;
            };

            history
                .entry(MonthKey::from_date(&repayment.created_at))
                .or_default()
                .push(HistoryEntry {
                    loan_id: repayment.loan_id,
                    borrower_id: repayment.borrower_id,
                    organisation_id: repayment.organisation_id,
                    payment_amount: repayment.payment_amount,
                    principal_component: repayment.principal_component,
                    interest_component: repayment.interest_component,
                    balance: repayment.balance,
                    payment_status: repayment.payment_status,
                    monthly_payment: loan.monthly_payment,
                    term_months: loan.term_months,
                });
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Borrower;
    use crate::month::utc_date;
    use crate::store::fake::FakeStore;
    use crate::testing::{loan_fixture, repayment_fixture};

    fn key(raw: &str) -> MonthKey {
        raw.parse().unwrap()
    }

    fn loan_created(created_at: DateTime<Utc>, term: i32) -> Loan {
        let mut loan = loan_fixture(Uuid::new_v4(), 1200.0, 0.24, 120.0, term);
        loan.created_at = created_at;
        loan
    }

    #[test]
    fn test_schedule_has_term_entries_in_consecutive_months() {
        let loan = loan_created(utc_date(2024, 11, 30).unwrap(), 6);
        let schedule = loan_schedule(&loan, None, utc_date(2024, 12, 1).unwrap());

        let months: Vec<String> = schedule.keys().map(|m| m.to_string()).collect();
        assert_eq!(
            months,
            vec!["2024-12", "2025-01", "2025-02", "2025-03", "2025-04", "2025-05"]
        );
    }

    #[test]
    fn test_missing_term_yields_empty_schedule() {
        let mut loan = loan_created(utc_date(2025, 1, 1).unwrap(), 12);
        loan.term_months = None;

        assert!(loan_schedule(&loan, None, Utc::now()).is_empty());
    }

    #[test]
    fn test_two_months_after_creation_with_no_repayments() {
        // Created 2025-01-15, "now" 2025-03-15 noon: both past due dates are missed
        let loan = loan_created(utc_date(2025, 1, 15).unwrap(), 12);
        let now = utc_date(2025, 3, 15).unwrap() + chrono::Duration::hours(12);

        let schedule = loan_schedule(&loan, None, now);

        assert_eq!(schedule[&key("2025-02")], MonthStatus::Missed);
        assert_eq!(schedule[&key("2025-03")], MonthStatus::Missed);
        assert!(schedule
            .iter()
            .skip(2)
            .all(|(_, status)| *status == MonthStatus::Upcoming));
        assert_eq!(schedule.len(), 12);
    }

    #[test]
    fn test_due_date_equal_to_now_is_not_upcoming() {
        let loan = loan_created(utc_date(2025, 1, 15).unwrap(), 3);
        let now = utc_date(2025, 2, 15).unwrap();

        let schedule = loan_schedule(&loan, None, now);
        assert_eq!(schedule[&key("2025-02")], MonthStatus::Missed);
        assert_eq!(schedule[&key("2025-03")], MonthStatus::Upcoming);
    }

    #[test]
    fn test_end_of_month_creation_keeps_clamped_day() {
        // Jan 31 -> Feb 28 -> Mar 28 -> Apr 28
        let loan = loan_created(utc_date(2025, 1, 31).unwrap(), 3);
        let now = utc_date(2025, 3, 29).unwrap();

        let schedule = loan_schedule(&loan, None, now);

        assert_eq!(schedule[&key("2025-02")], MonthStatus::Missed);
        assert_eq!(schedule[&key("2025-03")], MonthStatus::Missed);
        assert_eq!(schedule[&key("2025-04")], MonthStatus::Upcoming);
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn test_paid_requires_repayment_in_due_month() {
        let loan = loan_created(utc_date(2025, 1, 10).unwrap(), 4);
        let now = utc_date(2025, 4, 20).unwrap();
        let repayments = vec![
            repayment_fixture(&loan, 1104.0, utc_date(2025, 2, 3).unwrap()),
            // Paid late, in April for the March instalment: March stays missed
            repayment_fixture(&loan, 1008.0, utc_date(2025, 4, 12).unwrap()),
        ];
        let paid = paid_months_by_loan(&repayments);

        let schedule = loan_schedule(&loan, paid.get(&loan.id), now);
        assert_eq!(schedule[&key("2025-02")], MonthStatus::Paid);
        assert_eq!(schedule[&key("2025-03")], MonthStatus::Missed);
        assert_eq!(schedule[&key("2025-04")], MonthStatus::Paid);
        assert_eq!(schedule[&key("2025-05")], MonthStatus::Upcoming);
    }

    #[test]
    fn test_future_month_with_repayment_is_still_upcoming() {
        let loan = loan_created(utc_date(2025, 1, 20).unwrap(), 2);
        let now = utc_date(2025, 2, 10).unwrap();
        let repayments = vec![repayment_fixture(&loan, 1104.0, utc_date(2025, 2, 5).unwrap())];
        let paid = paid_months_by_loan(&repayments);

        let schedule = loan_schedule(&loan, paid.get(&loan.id), now);
        assert_eq!(schedule[&key("2025-02")], MonthStatus::Upcoming);
    }

    #[test]
    fn test_aggregate_totals_and_order() {
        let org = Uuid::new_v4();
        let make = |payment: Option<f64>, months: &[(&str, MonthStatus)]| LoanSchedule {
            loan_id: Uuid::new_v4(),
            monthly_payment: payment,
            borrower_id: Some(Uuid::new_v4()),
            organisation_id: org,
            payment_status_by_month: months.iter().map(|(m, s)| (key(m), *s)).collect(),
        };

        let schedules = vec![
            make(
                Some(120.0),
                &[("2025-03", MonthStatus::Upcoming), ("2025-02", MonthStatus::Missed)],
            ),
            make(
                Some(80.5),
                &[("2025-03", MonthStatus::Upcoming), ("2025-04", MonthStatus::Upcoming)],
            ),
            make(None, &[("2025-04", MonthStatus::Upcoming)]),
        ];

        let view = aggregate_upcoming(&schedules);

        assert!(view.has_upcoming_payments);
        assert_eq!(view.total_upcoming_months, 2);

        let march = &view.months_with_payments[0];
        assert_eq!(march.month, key("2025-03"));
        assert_eq!(march.month_display, "March 2025");
        assert_eq!(march.total_amount, 200.5);
        assert_eq!(march.loan_count, 2);

        let april = &view.months_with_payments[1];
        assert_eq!(april.total_amount, 80.5);
        assert_eq!(april.loan_count, 2);
        assert!(april.loans.iter().any(|l| l.monthly_payment == 0.0));
    }

    #[test]
    fn test_aggregate_empty() {
        let view = aggregate_upcoming(&[]);
        assert!(!view.has_upcoming_payments);
        assert_eq!(view.total_upcoming_months, 0);
        assert!(view.months_with_payments.is_empty());
    }

    #[tokio::test]
    async fn test_engine_organisation_without_loans() {
        let engine = ScheduleEngine::new(Arc::new(FakeStore::new()));
        let view = engine.get_schedule(Uuid::new_v4(), Utc::now()).await.unwrap();

        assert!(!view.has_upcoming_payments);
        assert!(engine
            .repayment_history(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_engine_schedule_only_counts_own_organisation() {
        let store = Arc::new(FakeStore::new());
        let now = utc_date(2025, 1, 5).unwrap();

        let mine = loan_created(utc_date(2025, 1, 1).unwrap(), 2);
        let mut theirs = loan_created(utc_date(2025, 1, 1).unwrap(), 2);
        theirs.organisation_id = Uuid::new_v4();

        store.add_loan(mine.clone(), Some("simple")).await;
        store.add_loan(theirs, Some("simple")).await;

        let view = ScheduleEngine::new(store)
            .get_schedule(mine.organisation_id, now)
            .await
            .unwrap();

        assert_eq!(view.total_upcoming_months, 2);
        assert!(view.months_with_payments.iter().all(|m| m.loan_count == 1));
    }

    #[tokio::test]
    async fn test_month_detail_joins_borrowers() {
        let store = Arc::new(FakeStore::new());
        let now = utc_date(2025, 1, 5).unwrap();

        let borrower = Borrower {
            id: Uuid::new_v4(),
            first_name: "Mwila".to_string(),
            last_name: "Banda".to_string(),
            nrc_number: Some("123456/10/1".to_string()),
            phone: Some("0977000000".to_string()),
        };
        store.add_borrower(borrower.clone()).await;

        let mut with_borrower = loan_created(utc_date(2025, 1, 1).unwrap(), 3);
        with_borrower.borrower_id = Some(borrower.id);
        let org = with_borrower.organisation_id;

        let mut orphan = loan_created(utc_date(2025, 1, 1).unwrap(), 3);
        orphan.organisation_id = org;
        orphan.borrower_id = Some(Uuid::new_v4());

        store.add_loan(with_borrower.clone(), Some("simple")).await;
        store.add_loan(orphan, Some("simple")).await;

        let engine = ScheduleEngine::new(store);
        let detail = engine.get_month_detail(org, key("2025-02"), now).await.unwrap();

        assert_eq!(detail.len(), 1);
        assert_eq!(detail[0].loan_id, with_borrower.id);
        assert_eq!(detail[0].first_name, "Mwila");
        assert_eq!(detail[0].phone_number.as_deref(), Some("0977000000"));
        assert_eq!(detail[0].payment_status, MonthStatus::Upcoming);

        let none = engine.get_month_detail(org, key("2026-02"), now).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_repayment_history_groups_by_month() {
        let store = Arc::new(FakeStore::new());
        let loan = loan_created(utc_date(2025, 1, 1).unwrap(), 12);
        store.add_loan(loan.clone(), Some("simple")).await;
        store
            .add_repayment(repayment_fixture(&loan, 1104.0, utc_date(2025, 2, 2).unwrap()))
            .await;
        store
            .add_repayment(repayment_fixture(&loan, 1008.0, utc_date(2025, 2, 28).unwrap()))
            .await;
        store
            .add_repayment(repayment_fixture(&loan, 912.0, utc_date(2025, 3, 1).unwrap()))
            .await;

        let history = ScheduleEngine::new(store)
            .repayment_history(loan.organisation_id)
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[&key("2025-02")].len(), 2);
        assert_eq!(history[&key("2025-03")][0].term_months, Some(12));
    }
}
