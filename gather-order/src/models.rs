use gather_catalog::RateCategory;
use gather_core::ContactDetails;
use gather_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the customer submits on the details step. Never persisted as-is.
///
/// Contact fields default to empty so a missing field is reported as a field
/// error by validation rather than as a JSON decoding failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAttempt {
    /// Client-generated; resubmitting the same attempt is idempotent for
    /// categories that take no payment, so those require it. Priced
    /// categories are keyed by the gateway handles and get a fresh one.
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
    pub event_id: Uuid,
    pub category: RateCategory,
    #[serde(default)]
    pub name: String,
    #[serde(default = "empty_masked")]
    pub email: Masked<String>,
    #[serde(default = "empty_masked")]
    pub phone: Masked<String>,
    #[serde(default)]
    pub age: Option<u16>,
    #[serde(default)]
    pub dietary_notes: Option<String>,
    #[serde(default)]
    pub prior_experience: Option<String>,
    #[serde(default)]
    pub terms_accepted: bool,
}

fn empty_masked() -> Masked<String> {
    Masked(String::new())
}

/// A `BookingAttempt` whose fields passed validation, normalized.
#[derive(Debug, Clone)]
pub struct ValidatedAttempt {
    pub attempt_id: Uuid,
    pub event_id: Uuid,
    pub category: RateCategory,
    pub customer: ContactDetails,
    pub dietary_notes: Option<String>,
    pub prior_experience: Option<String>,
}
