use async_trait::async_trait;
use gather_catalog::{CapacitySnapshot, Event, RateCategory};
use uuid::Uuid;

use crate::booking::{Booking, BookingId, IdempotencyKey};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Event {event_id} is full ({max_capacity} seats)")]
    CapacityExceeded { event_id: Uuid, max_capacity: u32 },
    #[error("Unknown event: {0}")]
    UnknownEvent(Uuid),
    #[error("Unknown rate category: {0}")]
    UnknownCategory(String),
    #[error("No reserved seat to release for {0}")]
    NothingToRelease(String),
    #[error("Capacity ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Booking already exists: {existing}")]
    Duplicate { existing: BookingId },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    Invalid(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result of a successful conditional increment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatReservation {
    pub event_id: Uuid,
    pub category: RateCategory,
    pub category_count: u32,
    pub total: u32,
    pub max_capacity: u32,
}

/// Read side of the admin-managed event catalog.
///
/// `upsert_event` writes descriptive fields and prices only; participant
/// counters belong to the `CapacityLedger`.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;

    async fn upsert_event(&self, event: &Event) -> Result<(), StoreError>;
}

/// Per-event seat counters with an atomic increment-with-constraint.
///
/// Implementations must serialize conflicting reservations at the store,
/// not in process memory of one API instance.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    /// Increment `participants[category]` only if the new total stays within `max_capacity`.
    async fn reserve_seat(
        &self,
        event_id: Uuid,
        category: &RateCategory,
    ) -> Result<SeatReservation, LedgerError>;

    /// Compensation for a reservation whose booking could not be stored.
    async fn release_seat(&self, event_id: Uuid, category: &RateCategory) -> Result<(), LedgerError>;

    async fn snapshot(&self, event_id: Uuid) -> Result<CapacitySnapshot, LedgerError>;
}

/// Append-only booking persistence, unique per idempotency key
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the key is already taken.
    async fn create_booking(&self, booking: &Booking) -> Result<BookingId, StoreError>;

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Booking>, StoreError>;

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;

    /// Oldest first.
    async fn list_bookings(&self, event_id: Option<Uuid>) -> Result<Vec<Booking>, StoreError>;
}
