// core/repayment-service/src/identity.rs
// Phone number lookup against organisations' registered numbers

use loanpay_common::{normalize_phone, validate_phone, ServiceError};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Organisation;
use crate::store::LoanStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LookupOutcome {
    pub found: bool,
    pub organisation_id: Option<Uuid>,
    /// Normalised form of the submitted number
    pub phone: String,
}

pub struct IdentityService {
    store: Arc<dyn LoanStore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn LoanStore>) -> Self {
        Self { store }
    }

    /// A number that cannot be valid is simply not found.
    pub async fn lookup(&self, raw_phone: &str) -> Result<LookupOutcome, ServiceError> {
        let phone = normalize_phone(raw_phone);
        if let Err(e) = validate_phone(&phone) {
            tracing::debug!(reason = %e, "Malformed phone number, skipping lookup");
            return Ok(LookupOutcome {
                found: false,
                organisation_id: None,
                phone,
            });
        }

        let organisation_id = self
            .store
            .find_organisation_by_phone(&phone)
            .await?
            .map(|o| o.id);

        Ok(LookupOutcome {
            found: organisation_id.is_some(),
            organisation_id,
            phone,
        })
    }

    pub async fn organisation(&self, organisation_id: Uuid) -> Result<Organisation, ServiceError> {
        self.store
            .get_organisation(organisation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Organisation {} not found", organisation_id)))
    }
}
