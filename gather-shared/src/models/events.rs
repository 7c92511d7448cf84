use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const TOPIC_BOOKING_RECONCILIATION: &str = "booking.reconciliation";

/// Published once per newly stored booking. Replays do not publish again.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: String,
    pub event_id: Uuid,
    pub category: String,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub order_handle: String,
    pub payment_handle: String,
    pub timestamp: i64,
}

/// Raised when money and bookings may disagree and a human has to look.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconciliationRequiredEvent {
    pub kind: String,
    pub reference: String,
    pub event_id: Uuid,
    pub category: String,
    pub order_handle: String,
    pub payment_handle: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}
