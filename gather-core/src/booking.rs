use chrono::{DateTime, Utc};
use gather_catalog::{Price, RateCategory};
use gather_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment handle stored on bookings that never went through the gateway.
pub const NO_PAYMENT_HANDLE: &str = "N/A";

/// Caller-visible booking reference: `BK-<yyyymmddHHMMSS>-<6 hex>`.
///
/// The timestamp prefix keeps references sortable by creation time and
/// traceable in support conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        Self(format!("BK-{}-{}", at.format("%Y%m%d%H%M%S"), suffix))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One booking per `(order_handle, payment_handle)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub order_handle: String,
    pub payment_handle: String,
}

impl IdempotencyKey {
    pub fn new(order_handle: impl Into<String>, payment_handle: impl Into<String>) -> Self {
        Self {
            order_handle: order_handle.into(),
            payment_handle: payment_handle.into(),
        }
    }

    /// Key for a placeholder-priced booking; `attempt_id` is supplied by the client.
    pub fn unpaid(attempt_id: Uuid) -> Self {
        Self::new(format!("free_{}", attempt_id.simple()), NO_PAYMENT_HANDLE)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_handle, self.payment_handle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactDetails {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub age: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Confirmed => f.write_str("CONFIRMED"),
        }
    }
}

/// Durable record of a confirmed booking. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub event_id: Uuid,
    pub event_title: String,
    pub category: RateCategory,
    /// What was actually charged: the server-side price, or the placeholder label.
    pub amount: Price,
    pub currency: String,
    pub order_handle: String,
    pub payment_handle: String,
    pub customer: ContactDetails,
    pub dietary_notes: Option<String>,
    pub prior_experience: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::new(self.order_handle.clone(), self.payment_handle.clone())
    }

    pub fn was_paid(&self) -> bool {
        self.payment_handle != NO_PAYMENT_HANDLE
    }
}
