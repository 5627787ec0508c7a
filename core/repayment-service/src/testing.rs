// core/repayment-service/src/testing.rs
// Fixtures, fake providers and an app harness shared by the unit tests

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loanpay_common::{Claims, DependencyHealth, HealthStatus, JwtManager, RepaymentMetrics};
use prometheus::Registry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::checkout::{price_checkout, CheckoutStore};
use crate::gateway::{GatewayError, PaymentGateway, PaymentRequest, PaymentStatus};
use crate::handlers::{self, AppState};
use crate::middleware::auth::AuthMiddleware;
use crate::models::{Borrower, Loan, Organisation, Repayment, STATUS_COMPLETE};
use crate::month::MonthKey;
use crate::otp::{OtpError, OtpProvider};
use crate::schedule::MonthStatus;
use crate::store::fake::FakeStore;

pub const APPROVED_CODE: &str = "123456";

pub fn organisation_fixture(phones: &[&str]) -> Organisation {
    let id = Uuid::new_v4();
    Organisation {
        id,
        name: format!("Lender {}", &id.to_string()[..8]),
        email: Some(format!("accounts-{}@lender.test", &id.to_string()[..8])),
        org_phone_numbers: phones.iter().map(|p| p.to_string()).collect(),
    }
}

/// A loan created now, nothing repaid yet.
pub fn loan_fixture(
    organisation_id: Uuid,
    loan_amount: f64,
    interest_rate: f64,
    monthly_payment: f64,
    term_months: i32,
) -> Loan {
    Loan {
        id: Uuid::new_v4(),
        organisation_id,
        borrower_id: Some(Uuid::new_v4()),
        loan_amount: Some(loan_amount),
        interest_rate: Some(interest_rate),
        monthly_payment: Some(monthly_payment),
        term_months: Some(term_months),
        created_at: Utc::now(),
        remaining_payments: Some(term_months),
    }
}

pub fn repayment_fixture(loan: &Loan, balance: f64, created_at: DateTime<Utc>) -> Repayment {
    Repayment {
        id: Uuid::new_v4(),
        loan_id: loan.id,
        organisation_id: loan.organisation_id,
        borrower_id: loan.borrower_id,
        payment_amount: loan.monthly_payment.unwrap_or(0.0),
        principal_component: 0.0,
        interest_component: 0.0,
        balance,
        payment_status: STATUS_COMPLETE.to_string(),
        payment_reference: None,
        created_at,
    }
}

/// Approves `APPROVED_CODE` for any number it was asked to send to.
#[derive(Default)]
pub struct FakeOtp {
    sent: Mutex<Vec<String>>,
    verified: Mutex<Vec<String>>,
    timeout: AtomicBool,
}

impl FakeOtp {
    pub fn fail_with_timeout(&self) {
        self.timeout.store(true, Ordering::SeqCst);
    }

    pub async fn sent_to(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    pub async fn verified(&self) -> Vec<String> {
        self.verified.lock().await.clone()
    }
}

#[async_trait]
impl OtpProvider for FakeOtp {
    async fn send(&self, phone: &str) -> Result<bool, OtpError> {
        if self.timeout.load(Ordering::SeqCst) {
            return Err(OtpError::Timeout);
        }
        self.sent.lock().await.push(phone.to_string());
        Ok(true)
    }

    async fn verify(&self, phone: &str, code: &str) -> Result<bool, OtpError> {
        if self.timeout.load(Ordering::SeqCst) {
            return Err(OtpError::Timeout);
        }
        self.verified.lock().await.push(phone.to_string());
        Ok(code == APPROVED_CODE)
    }
}

/// Hands out `pay-1`, `pay-2`, ... and reports Pending until told otherwise.
#[derive(Default)]
pub struct FakeGateway {
    next_id: AtomicU64,
    requests: Mutex<Vec<PaymentRequest>>,
    statuses: Mutex<HashMap<String, PaymentStatus>>,
    polled: Mutex<Vec<String>>,
    fail_next: StdMutex<Option<GatewayError>>,
}

impl FakeGateway {
    pub fn fail_next_initiate(&self, status: u16, message: &str) {
        if let Ok(mut next) = self.fail_next.lock() {
            *next = Some(GatewayError::Http {
                status,
                message: message.to_string(),
            });
        }
    }

    pub async fn set_status(&self, payment_id: &str, status: PaymentStatus) {
        self.statuses
            .lock()
            .await
            .insert(payment_id.to_string(), status);
    }

    pub async fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn polled(&self) -> Vec<String> {
        self.polled.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<String, GatewayError> {
        let failure = self.fail_next.lock().ok().and_then(|mut next| next.take());
        if let Some(err) = failure {
            return Err(err);
        }

        self.requests.lock().await.push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("pay-{}", n))
    }

    async fn poll(&self, payment_id: &str) -> PaymentStatus {
        self.polled.lock().await.push(payment_id.to_string());
        self.statuses
            .lock()
            .await
            .get(payment_id)
            .cloned()
            .unwrap_or(PaymentStatus::Pending)
    }

    async fn health(&self) -> DependencyHealth {
        DependencyHealth::new("payment_gateway", HealthStatus::Healthy)
    }
}

/// Fakes wired into the real routes and middleware.
pub struct TestApp {
    pub store: Arc<FakeStore>,
    pub otp: Arc<FakeOtp>,
    pub gateway: Arc<FakeGateway>,
    pub checkouts: Arc<CheckoutStore>,
    pub jwt_manager: JwtManager,
    pub metrics: RepaymentMetrics,
    state: web::Data<AppState>,
    registry: web::Data<Registry>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(FakeStore::new());
        let otp = Arc::new(FakeOtp::default());
        let gateway = Arc::new(FakeGateway::default());
        let checkouts = Arc::new(CheckoutStore::new());
        let jwt_manager = JwtManager::new("test-secret".to_string());
        let registry = Registry::new();
        let metrics = RepaymentMetrics::new(&registry).unwrap();

        let state = web::Data::new(AppState {
            store: store.clone(),
            otp: otp.clone(),
            gateway: gateway.clone(),
            jwt_manager: jwt_manager.clone(),
            checkouts: checkouts.clone(),
            metrics: metrics.clone(),
            session_ttl_hours: 1,
            start_time: SystemTime::now(),
        });

        Self {
            store,
            otp,
            gateway,
            checkouts,
            jwt_manager,
            metrics,
            state,
            registry: web::Data::new(registry),
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .wrap(AuthMiddleware::new(self.jwt_manager.clone()))
            .app_data(self.state.clone())
            .app_data(self.registry.clone())
            .configure(handlers::configure)
    }

    pub async fn organisation(&self, phones: &[&str]) -> Organisation {
        let organisation = organisation_fixture(phones);
        self.store.add_organisation(organisation.clone()).await;
        organisation
    }

    pub async fn borrower(&self, first_name: &str, last_name: &str) -> Borrower {
        let borrower = Borrower {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            nrc_number: Some("111111/11/1".to_string()),
            phone: Some("0977000000".to_string()),
        };
        self.store.add_borrower(borrower.clone()).await;
        borrower
    }

    pub fn session_with_claims(&self, organisation: &Organisation) -> (String, Claims) {
        let phone = organisation
            .org_phone_numbers
            .first()
            .cloned()
            .unwrap_or_default();
        self.jwt_manager
            .create_session(&phone, organisation.id, 1)
            .unwrap()
    }

    pub fn session_for(&self, organisation: &Organisation) -> String {
        self.session_with_claims(organisation).0
    }

    /// Store a checkout for the first month in which every loan is Upcoming.
    pub async fn checkout(&self, claims: &Claims, loan_ids: &[Uuid], fee: f64) -> MonthKey {
        let now = Utc::now();
        let schedules = self
            .state
            .schedule()
            .generate_payment_status(claims.organisation_id, now)
            .await
            .unwrap();

        let month = schedules
            .iter()
            .find(|s| s.loan_id == loan_ids[0])
            .and_then(|s| {
                s.payment_status_by_month
                    .iter()
                    .find(|(_, status)| **status == MonthStatus::Upcoming)
                    .map(|(month, _)| *month)
            })
            .unwrap();

        let checkout =
            price_checkout(&schedules, claims.organisation_id, loan_ids, month, fee, now).unwrap();
        self.checkouts.put_checkout(&claims.sid, checkout).await;
        month
    }

    /// Push the session's checkout through the fake gateway.
    pub async fn initiate(&self, claims: &Claims) -> String {
        let checkout = self.checkouts.checkout(&claims.sid).await.unwrap();
        let request = PaymentRequest::new(
            "Lender",
            checkout.month,
            &checkout.loan_ids,
            None,
            &claims.sub,
            checkout.charge_amount(),
        );
        let payment_id = self.gateway.initiate(&request).await.unwrap();
        self.checkouts
            .begin_payment(&claims.sid, &payment_id, Utc::now())
            .await
            .unwrap();
        payment_id
    }
}
