use async_trait::async_trait;
use chrono::Utc;
use gather_catalog::RateCategory;
use gather_shared::models::events::ReconciliationRequiredEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationKind {
    /// Payment captured but the event filled up before the seat was counted.
    PaidButFull,
    /// Payment captured, seat counted, booking write never succeeded.
    PersistenceFailed,
    /// A compensating release failed; the counter is one too high.
    SeatReleaseFailed,
    /// Payment captured but the ledger could not be reached.
    LedgerUnavailable,
}

impl fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconciliationKind::PaidButFull => "PAID_BUT_FULL",
            ReconciliationKind::PersistenceFailed => "PERSISTENCE_FAILED",
            ReconciliationKind::SeatReleaseFailed => "SEAT_RELEASE_FAILED",
            ReconciliationKind::LedgerUnavailable => "LEDGER_UNAVAILABLE",
        };
        f.write_str(s)
    }
}

/// A case a human has to settle: money moved, the booking did not land cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationCase {
    pub kind: ReconciliationKind,
    /// Reference quoted to the customer
    pub reference: String,
    pub event_id: Uuid,
    pub category: RateCategory,
    pub order_handle: String,
    pub payment_handle: String,
    pub detail: String,
}

impl ReconciliationCase {
    pub fn to_event(&self) -> ReconciliationRequiredEvent {
        ReconciliationRequiredEvent {
            kind: self.kind.to_string(),
            reference: self.reference.clone(),
            event_id: self.event_id,
            category: self.category.to_string(),
            order_handle: self.order_handle.clone(),
            payment_handle: self.payment_handle.clone(),
            detail: self.detail.clone(),
            raised_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReconciliationSink: Send + Sync {
    /// Must not fail the caller; sinks log their own delivery problems.
    async fn escalate(&self, case: ReconciliationCase);
}

/// Default sink: an error-level log line per case.
pub struct LogReconciliationSink;

#[async_trait]
impl ReconciliationSink for LogReconciliationSink {
    async fn escalate(&self, case: ReconciliationCase) {
        tracing::error!(
            kind = %case.kind,
            reference = %case.reference,
            event_id = %case.event_id,
            category = %case.category,
            order_id = %case.order_handle,
            payment_id = %case.payment_handle,
            "Manual reconciliation required: {}",
            case.detail
        );
    }
}
