//! In-process backends for development and tests.
//!
//! Each store keeps its state behind one mutex; every trait operation takes
//! the lock once, so a reservation is a single critical section just like the
//! row lock the Postgres ledger relies on.

use async_trait::async_trait;
use gather_catalog::{CapacityError, CapacitySnapshot, Event, RateCategory};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::booking::{Booking, BookingId, IdempotencyKey};
use crate::notify::{EmailMessage, Mailer, NotifyError};
use crate::payment::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentCompletion, PaymentGateway};
use crate::repository::{BookingStore, CapacityLedger, EventCatalog, LedgerError, SeatReservation, StoreError};
use crate::signature;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves plain data behind; keep serving it.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Event catalog and capacity ledger over one map.
#[derive(Default)]
pub struct InMemoryEvents {
    events: Mutex<HashMap<Uuid, Event>>,
}

impl InMemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event including its counters (test setup only).
    pub fn insert(&self, event: Event) {
        lock(&self.events).insert(event.id, event);
    }
}

#[async_trait]
impl EventCatalog for InMemoryEvents {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(lock(&self.events).get(&id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = lock(&self.events).values().cloned().collect();
        events.sort_by(|a, b| a.schedule.date.cmp(&b.schedule.date).then(a.title.cmp(&b.title)));
        Ok(events)
    }

    async fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        event.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut events = lock(&self.events);
        let mut incoming = event.clone();

        // Counters are owned by the ledger: carry them over, ignore the caller's.
        let existing = events.get(&event.id);
        for rate in incoming.categories.iter_mut() {
            rate.participants = existing
                .and_then(|e| e.rate(&rate.category).ok())
                .map(|r| r.participants)
                .unwrap_or(0);
        }
        if let Some(existing) = existing {
            for rate in &existing.categories {
                if rate.participants > 0 && incoming.rate(&rate.category).is_err() {
                    return Err(StoreError::Invalid(format!(
                        "category {} has bookings and cannot be removed",
                        rate.category
                    )));
                }
            }
        }
        let total = incoming.capacity().total();
        if incoming.max_capacity < total {
            return Err(StoreError::Invalid(format!(
                "max capacity {} is below {} reserved seats",
                incoming.max_capacity, total
            )));
        }

        events.insert(incoming.id, incoming);
        Ok(())
    }
}

#[async_trait]
impl CapacityLedger for InMemoryEvents {
    async fn reserve_seat(
        &self,
        event_id: Uuid,
        category: &RateCategory,
    ) -> Result<SeatReservation, LedgerError> {
        let mut events = lock(&self.events);
        let event = events.get_mut(&event_id).ok_or(LedgerError::UnknownEvent(event_id))?;

        let mut capacity = event.capacity();
        let count = capacity.admit(category).map_err(|e| match e {
            CapacityError::Full { max_capacity } => LedgerError::CapacityExceeded { event_id, max_capacity },
            CapacityError::UnknownCategory(c) | CapacityError::NothingToRelease(c) => {
                LedgerError::UnknownCategory(c)
            }
        })?;

        if let Some(rate) = event.categories.iter_mut().find(|r| &r.category == category) {
            rate.participants = count;
        }

        Ok(SeatReservation {
            event_id,
            category: category.clone(),
            category_count: count,
            total: capacity.total(),
            max_capacity: capacity.max_capacity,
        })
    }

    async fn release_seat(&self, event_id: Uuid, category: &RateCategory) -> Result<(), LedgerError> {
        let mut events = lock(&self.events);
        let event = events.get_mut(&event_id).ok_or(LedgerError::UnknownEvent(event_id))?;

        let mut capacity = event.capacity();
        let count = capacity.release(category).map_err(|e| match e {
            CapacityError::NothingToRelease(c) => LedgerError::NothingToRelease(c),
            CapacityError::UnknownCategory(c) => LedgerError::UnknownCategory(c),
            CapacityError::Full { max_capacity } => LedgerError::CapacityExceeded { event_id, max_capacity },
        })?;

        if let Some(rate) = event.categories.iter_mut().find(|r| &r.category == category) {
            rate.participants = count;
        }
        Ok(())
    }

    async fn snapshot(&self, event_id: Uuid) -> Result<CapacitySnapshot, LedgerError> {
        lock(&self.events)
            .get(&event_id)
            .map(|e| e.capacity())
            .ok_or(LedgerError::UnknownEvent(event_id))
    }
}

/// Booking store with optional injected write failures.
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<Vec<Booking>>,
    failing_creates: AtomicU32,
    lost_replies: AtomicU32,
    hidden_lookups: AtomicU32,
    create_calls: AtomicU32,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `create_booking` fail with `StoreError::Unavailable`.
    pub fn fail_next_creates(&self, n: u32) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// The next `n` successful writes are stored but reported as `Unavailable`.
    pub fn lose_next_replies(&self, n: u32) {
        self.lost_replies.store(n, Ordering::SeqCst);
    }

    /// The next `n` calls to `find_by_key` miss, as if the row were not yet visible.
    pub fn hide_next_lookups(&self, n: u32) {
        self.hidden_lookups.store(n, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.bookings).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create_booking(&self, booking: &Booking) -> Result<BookingId, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_creates) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        let mut bookings = lock(&self.bookings);
        let key = booking.idempotency_key();
        if let Some(existing) = bookings.iter().find(|b| b.idempotency_key() == key) {
            return Err(StoreError::Duplicate { existing: existing.id.clone() });
        }
        if bookings.iter().any(|b| b.id == booking.id) {
            return Err(StoreError::Invalid(format!("booking id {} already used", booking.id)));
        }
        bookings.push(booking.clone());
        if take_one(&self.lost_replies) {
            return Err(StoreError::Unavailable("connection reset after commit".to_string()));
        }
        Ok(booking.id.clone())
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Booking>, StoreError> {
        if take_one(&self.hidden_lookups) {
            return Ok(None);
        }
        Ok(lock(&self.bookings).iter().find(|b| &b.idempotency_key() == key).cloned())
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(lock(&self.bookings).iter().find(|b| &b.id == id).cloned())
    }

    async fn list_bookings(&self, event_id: Option<Uuid>) -> Result<Vec<Booking>, StoreError> {
        let mut out: Vec<Booking> = lock(&self.bookings)
            .iter()
            .filter(|b| event_id.map_or(true, |id| b.event_id == id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

/// Gateway double that remembers its orders and can sign completions for them.
pub struct MockPaymentGateway {
    secret: String,
    orders: Mutex<BTreeMap<String, GatewayOrder>>,
    receipts: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<GatewayError>>,
    sequence: AtomicU64,
}

impl MockPaymentGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            orders: Mutex::new(BTreeMap::new()),
            receipts: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Queue an error for the next `create_order` call.
    pub fn fail_next(&self, error: GatewayError) {
        lock(&self.failures).push_back(error);
    }

    /// Receipts seen by `create_order`, including failed calls.
    pub fn receipts(&self) -> Vec<String> {
        lock(&self.receipts).clone()
    }

    pub fn order_count(&self) -> usize {
        lock(&self.orders).len()
    }

    /// What the hosted checkout would hand back after a successful charge.
    pub fn complete_payment(&self, order_id: &str) -> PaymentCompletion {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let payment_id = format!("pay_mock{:08}", n);
        PaymentCompletion {
            order_id: order_id.to_string(),
            signature: signature::sign(order_id, &payment_id, &self.secret),
            payment_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        lock(&self.receipts).push(request.receipt.clone());
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        if request.amount <= 0 {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "amount must be at least 100".to_string(),
            });
        }

        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let order = GatewayOrder {
            id: format!("order_mock{:08}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
            notes: request.notes.clone(),
        };
        lock(&self.orders).insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        lock(&self.orders).get(order_id).cloned().ok_or_else(|| GatewayError::Rejected {
            status: 404,
            message: format!("order {} does not exist", order_id),
        })
    }
}

/// Mailer that keeps sent messages in memory.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing_sends: AtomicU32,
    attempts: AtomicU32,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sends(&self, n: u32) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(NotifyError::Transport("injected send failure".to_string()));
        }
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use gather_catalog::{CategoryRate, Price, Schedule, Venue};
    use std::sync::Arc;

    fn event(max_capacity: u32) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: "Night Kayak".to_string(),
            schedule: Schedule {
                date: NaiveDate::from_ymd_opt(2026, 12, 5).unwrap(),
                start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                duration: "3 hours".to_string(),
            },
            venue: Venue { name: "Lake Jetty".to_string(), address: "North Shore".to_string() },
            max_capacity,
            categories: vec![
                CategoryRate { category: "male".into(), price: Price::fixed(50_000), participants: 0 },
                CategoryRate { category: "female".into(), price: Price::fixed(45_000), participants: 0 },
            ],
        }
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_capacity() {
        let ledger = Arc::new(InMemoryEvents::new());
        let ev = event(7);
        let id = ev.id;
        ledger.insert(ev);

        let mut handles = Vec::new();
        for i in 0..40 {
            let ledger = ledger.clone();
            let category = if i % 2 == 0 { RateCategory::new("male") } else { RateCategory::new("female") };
            handles.push(tokio::spawn(async move { ledger.reserve_seat(id, &category).await }));
        }

        let mut ok = 0;
        let mut full = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::CapacityExceeded { .. }) => full += 1,
                Err(other) => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(ok, 7);
        assert_eq!(full, 33);
        assert_eq!(ledger.snapshot(id).await.unwrap().total(), 7);
    }

    #[tokio::test]
    async fn test_upsert_keeps_ledger_counters() {
        let events = InMemoryEvents::new();
        let ev = event(3);
        let id = ev.id;
        events.insert(ev.clone());
        events.reserve_seat(id, &"male".into()).await.unwrap();
        events.reserve_seat(id, &"male".into()).await.unwrap();

        let mut edited = ev.clone();
        edited.title = "Night Kayak (new route)".to_string();
        edited.categories[0].participants = 0;
        events.upsert_event(&edited).await.unwrap();

        let stored = events.get_event(id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Night Kayak (new route)");
        assert_eq!(stored.categories[0].participants, 2);

        edited.max_capacity = 1;
        assert!(matches!(events.upsert_event(&edited).await, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_mock_gateway_signs_verifiable_completions() {
        let gateway = MockPaymentGateway::new("s3cret");
        let order = gateway
            .create_order(&CreateOrderRequest {
                amount: 50_000,
                currency: "INR".to_string(),
                receipt: "rcpt_1".to_string(),
                notes: BTreeMap::new(),
            })
            .await
            .unwrap();

        let completion = gateway.complete_payment(&order.id);
        assert!(signature::verify(&completion.order_id, &completion.payment_id, &completion.signature, "s3cret"));
        assert_eq!(gateway.fetch_order(&order.id).await.unwrap().amount, 50_000);
    }
}
