use chrono::Utc;
use gather_catalog::{Event, Price, RateCategory};
use gather_core::{
    Booking, BookingId, BookingSnapshot, BookingStatus, BookingStore, CapacityLedger, EventCatalog,
    GatewayOrder, IdempotencyKey, LedgerError, PaymentCompletion, ReconciliationCase,
    ReconciliationKind, ReconciliationSink, SeatReservation, SignatureVerifier, StoreError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{BookingError, BookingFailure};
use crate::flow::{BookingFlow, BookingStage};
use crate::models::{BookingAttempt, ValidatedAttempt};
use crate::notify::{NotificationDispatcher, NotificationHandle};
use crate::order_service::OrderService;
use crate::retry::RetryPolicy;
use crate::validation::{validate_attempt, FieldError};

const NOTE_EVENT_ID: &str = "event_id";
const NOTE_CATEGORY: &str = "category";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Applied to `CreateBooking` after a seat has been reserved.
    pub persist_policy: RetryPolicy,
    /// Re-reads of the idempotency key when the event reports full, giving an
    /// in-flight write of the same submission time to become visible.
    pub duplicate_policy: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            persist_policy: RetryPolicy::default(),
            duplicate_policy: RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(200)),
        }
    }
}

/// Storage-side collaborators of the orchestrator.
#[derive(Clone)]
pub struct BookingBackends {
    pub catalog: Arc<dyn EventCatalog>,
    pub ledger: Arc<dyn CapacityLedger>,
    pub store: Arc<dyn BookingStore>,
    pub reconciliation: Arc<dyn ReconciliationSink>,
}

/// Checkout result for a paid category: the client opens the gateway's
/// hosted checkout for `order` and comes back with a `PaymentCompletion`.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub attempt_id: Uuid,
    pub event_id: Uuid,
    pub category: RateCategory,
    pub order: GatewayOrder,
    pub amount_display: String,
}

#[derive(Debug)]
pub enum Checkout {
    AwaitingPayment(PendingPayment),
    /// Placeholder-priced categories are confirmed without a payment step.
    Confirmed(Confirmation),
}

#[derive(Debug)]
pub struct Confirmation {
    pub booking: Booking,
    pub chat_link: String,
    /// The idempotency key had already been committed; nothing new was written.
    pub replayed: bool,
    /// `None` for replays. Dropping it leaves the send running.
    pub notification: Option<NotificationHandle>,
}

/// Drives one booking attempt through validation, payment, verification and
/// commit. Holds no per-attempt state between HTTP requests.
pub struct BookingOrchestrator {
    catalog: Arc<dyn EventCatalog>,
    ledger: Arc<dyn CapacityLedger>,
    store: Arc<dyn BookingStore>,
    reconciliation: Arc<dyn ReconciliationSink>,
    orders: OrderService,
    verifier: SignatureVerifier,
    notifier: NotificationDispatcher,
    settings: OrchestratorSettings,
}

impl BookingOrchestrator {
    pub fn new(
        backends: BookingBackends,
        orders: OrderService,
        verifier: SignatureVerifier,
        notifier: NotificationDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            catalog: backends.catalog,
            ledger: backends.ledger,
            store: backends.store,
            reconciliation: backends.reconciliation,
            orders,
            verifier,
            notifier,
            settings,
        }
    }

    pub fn order_service(&self) -> &OrderService {
        &self.orders
    }

    /// Standalone signature check; logs mismatches.
    pub fn verify_completion(&self, completion: &PaymentCompletion) -> bool {
        let ok = self.verifier.verify(completion);
        if !ok {
            tracing::warn!(
                order_id = %completion.order_id,
                payment_id = %completion.payment_id,
                "Payment signature mismatch"
            );
        }
        ok
    }

    /// Details step. Creates a gateway order for priced categories; books
    /// placeholder-priced categories straight away.
    pub async fn checkout(&self, attempt: BookingAttempt) -> Result<Checkout, BookingFailure> {
        let supplied_id = attempt.attempt_id;
        let attempt = validate_attempt(&attempt).map_err(|errors| {
            BookingFailure::new(BookingStage::CollectingDetails, BookingError::Validation(errors))
        })?;
        let mut flow = BookingFlow::new(attempt.attempt_id);
        let stage = flow.stage();
        let event = self.load_event(attempt.event_id).await.map_err(|e| BookingFailure::new(stage, e))?;
        let price = event
            .price(&attempt.category)
            .map_err(|_| BookingFailure::new(stage, BookingError::UnknownCategory(attempt.category.to_string())))?
            .clone();

        if event.remaining_seats() == 0 {
            tracing::info!(event_id = %event.id, "Checkout refused: event is full");
            return Err(BookingFailure::new(stage, BookingError::EventFull { event_id: event.id, reference: None }));
        }

        let amount = match price.amount_minor() {
            Some(amount) => amount,
            None => {
                // The attempt id is the only idempotency key without payment.
                if supplied_id.is_none() {
                    return Err(BookingFailure::new(
                        stage,
                        BookingError::Validation(vec![FieldError::new(
                            "attempt_id",
                            "Please refresh the page and submit again",
                        )]),
                    ));
                }
                tracing::info!(
                    attempt_id = %attempt.attempt_id,
                    event_id = %event.id,
                    category = %attempt.category,
                    "Placeholder-priced category, skipping payment"
                );
                flow.advance(BookingStage::Committing).map_err(|e| BookingFailure::new(stage, e))?;
                let key = IdempotencyKey::unpaid(attempt.attempt_id);
                return self
                    .commit(&mut flow, &attempt, &event, price, key)
                    .await
                    .map(Checkout::Confirmed);
            }
        };

        let mut notes = BTreeMap::new();
        notes.insert(NOTE_EVENT_ID.to_string(), event.id.to_string());
        notes.insert(NOTE_CATEGORY.to_string(), attempt.category.to_string());
        notes.insert("event_title".to_string(), event.title.clone());
        notes.insert("attempt_id".to_string(), attempt.attempt_id.to_string());
        notes.insert("customer_name".to_string(), attempt.customer.name.clone());

        let order = self
            .orders
            .create_order(amount, None, None, notes)
            .await
            .map_err(|e| {
                tracing::warn!(event_id = %event.id, category = %attempt.category, "Order creation failed: {}", e);
                BookingFailure::new(stage, e)
            })?;

        flow.advance(BookingStage::AwaitingPayment).map_err(|e| BookingFailure::new(stage, e))?;

        Ok(Checkout::AwaitingPayment(PendingPayment {
            attempt_id: attempt.attempt_id,
            event_id: event.id,
            category: attempt.category,
            amount_display: price.display(&order.currency),
            order,
        }))
    }

    /// Completion step for priced categories: verify, cross-check, commit.
    pub async fn confirm(
        &self,
        attempt: BookingAttempt,
        completion: PaymentCompletion,
    ) -> Result<Confirmation, BookingFailure> {
        let attempt = validate_attempt(&attempt).map_err(|errors| {
            BookingFailure::new(BookingStage::AwaitingPayment, BookingError::Validation(errors))
        })?;
        let mut flow = BookingFlow::resume_awaiting_payment(attempt.attempt_id);
        flow.advance(BookingStage::Verifying).map_err(|e| BookingFailure::new(flow.stage(), e))?;

        if !self.verify_completion(&completion) {
            return Err(reject(
                &mut flow,
                BookingError::NotAuthentic {
                    order_id: completion.order_id.clone(),
                    payment_id: completion.payment_id.clone(),
                },
            ));
        }

        let event = self
            .load_event(attempt.event_id)
            .await
            .map_err(|e| BookingFailure::new(flow.stage(), e))?;
        let price = match event.price(&attempt.category) {
            Ok(price) => price.clone(),
            Err(_) => return Err(reject(&mut flow, BookingError::UnknownCategory(attempt.category.to_string()))),
        };

        // Gateway unreachable leaves the attempt at Verifying; the client may resubmit.
        let order = self
            .orders
            .fetch_order(&completion.order_id)
            .await
            .map_err(|e| BookingFailure::new(flow.stage(), e))?;

        if let Err(reason) = cross_check(&order, &event, &attempt.category, &price) {
            tracing::warn!(
                order_id = %order.id,
                payment_id = %completion.payment_id,
                event_id = %event.id,
                "Order does not match booking: {}",
                reason
            );
            return Err(reject(&mut flow, BookingError::OrderMismatch { order_id: order.id, reason }));
        }

        flow.advance(BookingStage::Committing).map_err(|e| BookingFailure::new(flow.stage(), e))?;
        let key = IdempotencyKey::new(completion.order_id, completion.payment_id);
        self.commit(&mut flow, &attempt, &event, price, key).await
    }

    async fn load_event(&self, event_id: Uuid) -> Result<Event, BookingError> {
        match self.catalog.get_event(event_id).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(BookingError::EventNotFound(event_id)),
            Err(e) => Err(BookingError::Unavailable(e.to_string())),
        }
    }

    /// Reserve a seat and persist the booking so that every stored booking
    /// has exactly one counted seat and vice versa.
    async fn commit(
        &self,
        flow: &mut BookingFlow,
        attempt: &ValidatedAttempt,
        event: &Event,
        price: Price,
        key: IdempotencyKey,
    ) -> Result<Confirmation, BookingFailure> {
        let paid = price.requires_payment();

        if let Some(existing) = self.lookup(&key).await {
            return self.replay(flow, event, existing);
        }

        let booking_id = BookingId::generate(Utc::now());
        let reservation = match self.ledger.reserve_seat(event.id, &attempt.category).await {
            Ok(reservation) => reservation,
            Err(LedgerError::CapacityExceeded { event_id, max_capacity }) => {
                // A concurrent submission of the same key may hold the seat
                // with its write still in flight.
                if let Some(existing) = self.settled_lookup(&key).await {
                    return self.replay(flow, event, existing);
                }
                tracing::info!(event_id = %event_id, max_capacity, category = %attempt.category, "Event full at commit");
                let reference = if paid {
                    self.escalate(
                        ReconciliationKind::PaidButFull,
                        &booking_id,
                        event.id,
                        &attempt.category,
                        &key,
                        format!("payment captured but all {} seats are taken", max_capacity),
                    )
                    .await;
                    Some(booking_id.to_string())
                } else {
                    None
                };
                return Err(reject(flow, BookingError::EventFull { event_id, reference }));
            }
            Err(e) => {
                let error = if paid {
                    self.escalate(
                        ReconciliationKind::LedgerUnavailable,
                        &booking_id,
                        event.id,
                        &attempt.category,
                        &key,
                        e.to_string(),
                    )
                    .await;
                    BookingError::ReconciliationRequired {
                        kind: ReconciliationKind::LedgerUnavailable,
                        reference: booking_id.to_string(),
                    }
                } else {
                    match e {
                        LedgerError::UnknownEvent(id) => BookingError::EventNotFound(id),
                        LedgerError::UnknownCategory(c) => BookingError::UnknownCategory(c),
                        other => BookingError::Unavailable(other.to_string()),
                    }
                };
                return Err(reject(flow, error));
            }
        };

        tracing::debug!(
            event_id = %reservation.event_id,
            category = %reservation.category,
            category_count = reservation.category_count,
            total = reservation.total,
            max_capacity = reservation.max_capacity,
            "Seat reserved"
        );

        let booking = Booking {
            id: booking_id.clone(),
            event_id: event.id,
            event_title: event.title.clone(),
            category: attempt.category.clone(),
            amount: price,
            currency: self.orders.default_currency().to_string(),
            order_handle: key.order_handle.clone(),
            payment_handle: key.payment_handle.clone(),
            customer: attempt.customer.clone(),
            dietary_notes: attempt.dietary_notes.clone(),
            prior_experience: attempt.prior_experience.clone(),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };

        let stored = self
            .settings
            .persist_policy
            .run("booking write", || self.store.create_booking(&booking), StoreError::is_retryable)
            .await;

        match stored {
            Ok(_) => self.confirmed(flow, event, booking),
            // An earlier try of this same write landed but its reply was lost.
            Err(StoreError::Duplicate { existing }) if existing == booking.id => {
                tracing::warn!(booking_id = %booking.id, "Booking write reported duplicate of itself");
                self.confirmed(flow, event, booking)
            }
            Err(StoreError::Duplicate { existing }) => {
                // Lost a race with an identical submission; give the seat back.
                self.release(&reservation, &booking_id, &key).await;
                let winner = match self.store.get_booking(&existing).await {
                    Ok(Some(b)) => Some(b),
                    _ => self.lookup(&key).await,
                };
                match winner {
                    Some(b) => self.replay(flow, event, b),
                    None => Err(reject(
                        flow,
                        BookingError::Unavailable(format!("booking {} reported but not readable", existing)),
                    )),
                }
            }
            Err(e) => {
                tracing::error!(booking_id = %booking.id, order_id = %key.order_handle, "Booking write failed: {}", e);
                // A failed call does not prove the row is absent.
                match self.lookup(&key).await {
                    Some(found) if found.id == booking.id => {
                        tracing::warn!(booking_id = %booking.id, "Booking write landed despite the error");
                        return self.confirmed(flow, event, booking);
                    }
                    Some(found) => {
                        self.release(&reservation, &booking_id, &key).await;
                        return self.replay(flow, event, found);
                    }
                    None => {}
                }
                self.release(&reservation, &booking_id, &key).await;
                let error = if paid {
                    self.escalate(
                        ReconciliationKind::PersistenceFailed,
                        &booking_id,
                        event.id,
                        &attempt.category,
                        &key,
                        e.to_string(),
                    )
                    .await;
                    BookingError::ReconciliationRequired {
                        kind: ReconciliationKind::PersistenceFailed,
                        reference: booking_id.to_string(),
                    }
                } else {
                    BookingError::Unavailable(e.to_string())
                };
                Err(reject(flow, error))
            }
        }
    }

    async fn lookup(&self, key: &IdempotencyKey) -> Option<Booking> {
        match self.store.find_by_key(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, "Idempotency lookup failed: {}", e);
                None
            }
        }
    }

    async fn settled_lookup(&self, key: &IdempotencyKey) -> Option<Booking> {
        let policy = &self.settings.duplicate_policy;
        for attempt in 1..=policy.max_attempts {
            if let Some(found) = self.lookup(key).await {
                return Some(found);
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
        None
    }

    fn confirmed(&self, flow: &mut BookingFlow, event: &Event, booking: Booking) -> Result<Confirmation, BookingFailure> {
        flow.advance(BookingStage::Confirmed).map_err(|e| BookingFailure::new(flow.stage(), e))?;
        tracing::info!(
            booking_id = %booking.id,
            event_id = %booking.event_id,
            category = %booking.category,
            order_id = %booking.order_handle,
            "Booking confirmed"
        );
        Ok(self.confirmation(event, booking, false))
    }

    fn replay(&self, flow: &mut BookingFlow, event: &Event, booking: Booking) -> Result<Confirmation, BookingFailure> {
        flow.advance(BookingStage::Confirmed).map_err(|e| BookingFailure::new(flow.stage(), e))?;
        tracing::info!(booking_id = %booking.id, order_id = %booking.order_handle, "Duplicate submission, returning stored booking");
        Ok(self.confirmation(event, booking, true))
    }

    fn confirmation(&self, event: &Event, booking: Booking, replayed: bool) -> Confirmation {
        let snapshot = BookingSnapshot {
            booking: booking.clone(),
            schedule: event.schedule.clone(),
            venue: event.venue.clone(),
        };
        let chat_link = self.notifier.chat_link(&snapshot);
        let notification = (!replayed).then(|| self.notifier.dispatch(snapshot));
        Confirmation { booking, chat_link, replayed, notification }
    }

    async fn release(&self, reservation: &SeatReservation, booking_id: &BookingId, key: &IdempotencyKey) {
        match self.ledger.release_seat(reservation.event_id, &reservation.category).await {
            Ok(()) => tracing::info!(event_id = %reservation.event_id, category = %reservation.category, "Seat released"),
            Err(e) => {
                self.escalate(
                    ReconciliationKind::SeatReleaseFailed,
                    booking_id,
                    reservation.event_id,
                    &reservation.category,
                    key,
                    e.to_string(),
                )
                .await
            }
        }
    }

    async fn escalate(
        &self,
        kind: ReconciliationKind,
        reference: &BookingId,
        event_id: Uuid,
        category: &RateCategory,
        key: &IdempotencyKey,
        detail: String,
    ) {
        self.reconciliation
            .escalate(ReconciliationCase {
                kind,
                reference: reference.to_string(),
                event_id,
                category: category.clone(),
                order_handle: key.order_handle.clone(),
                payment_handle: key.payment_handle.clone(),
                detail,
            })
            .await;
    }
}

fn reject(flow: &mut BookingFlow, error: BookingError) -> BookingFailure {
    if let Err(e) = flow.advance(BookingStage::Rejected) {
        tracing::debug!("{}", e);
    }
    BookingFailure::new(flow.stage(), error)
}

/// The order the client paid must be the one checkout created for this
/// event, category and server-side price.
fn cross_check(order: &GatewayOrder, event: &Event, category: &RateCategory, price: &Price) -> Result<(), String> {
    let expected = price
        .amount_minor()
        .ok_or_else(|| format!("category {} takes no payment", category))?;
    if order.amount != expected {
        return Err(format!("amount {} differs from price {}", order.amount, expected));
    }
    match order.notes.get(NOTE_EVENT_ID) {
        Some(id) if id == &event.id.to_string() => {}
        other => return Err(format!("order is for event {:?}", other)),
    }
    match order.notes.get(NOTE_CATEGORY).map(|c| RateCategory::new(c)) {
        Some(c) if &c == category => Ok(()),
        other => Err(format!("order is for category {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationSettings;
    use chrono::{NaiveDate, NaiveTime};
    use gather_catalog::{CategoryRate, Schedule, Venue};
    use gather_core::memory::{InMemoryBookingStore, InMemoryEvents, MockPaymentGateway, RecordingMailer};
    use gather_core::{CreateOrderRequest, GatewayError, PaymentGateway, NO_PAYMENT_HANDLE};
    use gather_shared::Masked;
    use std::sync::Mutex;
    use std::time::Duration;

    const SECRET: &str = "test_secret_key";

    #[derive(Default)]
    struct RecordingSink {
        cases: Mutex<Vec<ReconciliationCase>>,
    }

    #[async_trait::async_trait]
    impl ReconciliationSink for RecordingSink {
        async fn escalate(&self, case: ReconciliationCase) {
            self.cases.lock().unwrap().push(case);
        }
    }

    struct Harness {
        events: Arc<InMemoryEvents>,
        store: Arc<InMemoryBookingStore>,
        gateway: Arc<MockPaymentGateway>,
        mailer: Arc<RecordingMailer>,
        sink: Arc<RecordingSink>,
        orchestrator: Arc<BookingOrchestrator>,
        event_id: Uuid,
    }

    impl Harness {
        fn new(max_capacity: u32) -> Self {
            Self::with_policies(max_capacity, RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)), 2)
        }

        fn with_policies(max_capacity: u32, persist_policy: RetryPolicy, email_attempts: u32) -> Self {
            let events = Arc::new(InMemoryEvents::new());
            let event = Event {
                id: Uuid::new_v4(),
                title: "Sunrise Trek".to_string(),
                schedule: Schedule {
                    date: NaiveDate::from_ymd_opt(2026, 11, 14).unwrap(),
                    start_time: NaiveTime::from_hms_opt(5, 30, 0).unwrap(),
                    duration: "4 hours".to_string(),
                },
                venue: Venue { name: "Base Camp".to_string(), address: "Hill Road".to_string() },
                max_capacity,
                categories: vec![
                    CategoryRate { category: "male".into(), price: Price::fixed(50_000), participants: 0 },
                    CategoryRate { category: "female".into(), price: Price::fixed(45_000), participants: 0 },
                    CategoryRate {
                        category: "volunteer".into(),
                        price: Price::placeholder("Free for crew"),
                        participants: 0,
                    },
                ],
            };
            let event_id = event.id;
            events.insert(event);

            let store = Arc::new(InMemoryBookingStore::new());
            let gateway = Arc::new(MockPaymentGateway::new(SECRET));
            let mailer = Arc::new(RecordingMailer::new());
            let sink = Arc::new(RecordingSink::default());

            let orchestrator = BookingOrchestrator::new(
                BookingBackends {
                    catalog: events.clone(),
                    ledger: events.clone(),
                    store: store.clone(),
                    reconciliation: sink.clone(),
                },
                OrderService::new(gateway.clone(), "INR", Duration::from_secs(1)),
                SignatureVerifier::new(SECRET).unwrap(),
                NotificationDispatcher::new(
                    mailer.clone(),
                    NotificationSettings {
                        chat_phone: "919000000000".to_string(),
                        email_timeout: Duration::from_millis(200),
                        email_policy: RetryPolicy::new(email_attempts, Duration::from_millis(1), Duration::from_millis(2)),
                    },
                ),
                OrchestratorSettings {
                    persist_policy,
                    duplicate_policy: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
                },
            );

            Self {
                events,
                store,
                gateway,
                mailer,
                sink,
                orchestrator: Arc::new(orchestrator),
                event_id,
            }
        }

        fn attempt(&self, category: &str, name: &str) -> BookingAttempt {
            BookingAttempt {
                attempt_id: Some(Uuid::new_v4()),
                event_id: self.event_id,
                category: category.into(),
                name: name.to_string(),
                email: Masked(format!("{}@example.com", name.to_lowercase())),
                phone: Masked("9876543210".to_string()),
                age: Some(30),
                dietary_notes: None,
                prior_experience: None,
                terms_accepted: true,
            }
        }

        async fn checkout_paid(&self, attempt: &BookingAttempt) -> PendingPayment {
            match self.orchestrator.checkout(attempt.clone()).await.unwrap() {
                Checkout::AwaitingPayment(pending) => pending,
                other => panic!("expected a payment step, got {:?}", other),
            }
        }

        async fn reserved(&self) -> u32 {
            self.events.snapshot(self.event_id).await.unwrap().total()
        }

        fn cases(&self) -> Vec<ReconciliationCase> {
            self.sink.cases.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_paid_booking_confirms_and_notifies() {
        let h = Harness::new(10);
        let attempt = h.attempt("Male", "Arjun");

        let pending = h.checkout_paid(&attempt).await;
        assert_eq!(pending.order.amount, 50_000);
        assert_eq!(pending.amount_display, "INR 500.00");
        assert_eq!(pending.order.notes.get("event_id"), Some(&h.event_id.to_string()));

        let completion = h.gateway.complete_payment(&pending.order.id);
        let confirmation = h.orchestrator.confirm(attempt, completion.clone()).await.unwrap();

        assert!(!confirmation.replayed);
        assert_eq!(confirmation.booking.amount, Price::fixed(50_000));
        assert_eq!(confirmation.booking.payment_handle, completion.payment_id);
        assert!(confirmation.chat_link.starts_with("https://wa.me/919000000000?text="));

        let report = confirmation.notification.unwrap().wait().await.unwrap();
        assert_eq!(report.email, Ok(()));
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
    }

    #[tokio::test]
    async fn test_placeholder_category_skips_payment() {
        let h = Harness::new(10);
        let attempt = h.attempt("volunteer", "Meera");

        let confirmation = match h.orchestrator.checkout(attempt.clone()).await.unwrap() {
            Checkout::Confirmed(c) => c,
            other => panic!("expected direct confirmation, got {:?}", other),
        };
        assert_eq!(h.gateway.order_count(), 0);
        assert!(h.gateway.receipts().is_empty());
        assert_eq!(confirmation.booking.payment_handle, NO_PAYMENT_HANDLE);
        assert!(confirmation.booking.order_handle.starts_with("free_"));
        assert!(!confirmation.booking.was_paid());
        assert_eq!(h.reserved().await, 1);

        // Same attempt submitted again collapses onto the stored booking.
        let again = match h.orchestrator.checkout(attempt).await.unwrap() {
            Checkout::Confirmed(c) => c,
            other => panic!("expected replay, got {:?}", other),
        };
        assert!(again.replayed);
        assert!(again.notification.is_none());
        assert_eq!(again.booking.id, confirmation.booking.id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejects_without_touching_state() {
        let h = Harness::new(10);
        let attempt = h.attempt("female", "Kavya");
        let pending = h.checkout_paid(&attempt).await;

        let mut completion = h.gateway.complete_payment(&pending.order.id);
        let flipped = if completion.signature.starts_with('0') { "1" } else { "0" };
        completion.signature.replace_range(0..1, flipped);

        let failure = h.orchestrator.confirm(attempt, completion).await.unwrap_err();
        assert_eq!(failure.stage, BookingStage::Rejected);
        assert!(matches!(failure.error, BookingError::NotAuthentic { .. }));
        assert!(h.store.is_empty());
        assert_eq!(h.reserved().await, 0);
    }

    #[tokio::test]
    async fn test_order_for_wrong_amount_is_rejected() {
        let h = Harness::new(10);
        let attempt = h.attempt("male", "Dev");

        let mut notes = BTreeMap::new();
        notes.insert("event_id".to_string(), h.event_id.to_string());
        notes.insert("category".to_string(), "male".to_string());
        let cheap = h
            .gateway
            .create_order(&CreateOrderRequest {
                amount: 100,
                currency: "INR".to_string(),
                receipt: "rcpt_cheap".to_string(),
                notes,
            })
            .await
            .unwrap();
        let completion = h.gateway.complete_payment(&cheap.id);

        let failure = h.orchestrator.confirm(attempt, completion).await.unwrap_err();
        assert_eq!(failure.stage, BookingStage::Rejected);
        assert!(matches!(failure.error, BookingError::OrderMismatch { .. }));
        assert!(h.store.is_empty());
        assert_eq!(h.reserved().await, 0);
    }

    #[tokio::test]
    async fn test_last_seat_goes_to_first_verified_payment() {
        let h = Harness::new(1);
        let user_a = h.attempt("male", "Alice");
        let user_b = h.attempt("male", "Bharat");

        let order_a = h.checkout_paid(&user_a).await;
        let order_b = h.checkout_paid(&user_b).await;
        assert_eq!(order_a.order.amount, 50_000);
        assert_eq!(order_b.order.amount, 50_000);

        let paid_a = h.gateway.complete_payment(&order_a.order.id);
        let paid_b = h.gateway.complete_payment(&order_b.order.id);
        assert!(h.orchestrator.verify_completion(&paid_b));

        h.orchestrator.confirm(user_a, paid_a).await.unwrap();
        let failure = h.orchestrator.confirm(user_b, paid_b.clone()).await.unwrap_err();

        assert_eq!(failure.stage, BookingStage::Rejected);
        let reference = match &failure.error {
            BookingError::EventFull { reference: Some(r), .. } => r.clone(),
            other => panic!("expected a paid event-full rejection, got {:?}", other),
        };
        assert!(failure.error.user_message().contains(&reference));

        let cases = h.cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].kind, ReconciliationKind::PaidButFull);
        assert_eq!(cases[0].reference, reference);
        assert_eq!(cases[0].payment_handle, paid_b.payment_id);

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
    }

    #[tokio::test]
    async fn test_full_event_refused_before_order_creation() {
        let h = Harness::new(1);
        h.orchestrator.checkout(h.attempt("volunteer", "Crew")).await.unwrap();

        let failure = h.orchestrator.checkout(h.attempt("male", "Late")).await.unwrap_err();
        assert_eq!(failure.stage, BookingStage::CollectingDetails);
        assert!(matches!(failure.error, BookingError::EventFull { reference: None, .. }));
        assert_eq!(failure.error.user_message(), "Sorry, this event is full");
        assert_eq!(h.gateway.order_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_never_overbook() {
        let h = Harness::new(5);
        let mut paid = Vec::new();
        for i in 0..20 {
            let attempt = h.attempt(if i % 2 == 0 { "male" } else { "female" }, &format!("Guest{}", i));
            let pending = h.checkout_paid(&attempt).await;
            let completion = h.gateway.complete_payment(&pending.order.id);
            paid.push((attempt, completion));
        }

        let mut handles = Vec::new();
        for (attempt, completion) in paid {
            let orchestrator = h.orchestrator.clone();
            handles.push(tokio::spawn(async move { orchestrator.confirm(attempt, completion).await }));
        }

        let mut confirmed = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => confirmed += 1,
                Err(BookingFailure { error: BookingError::EventFull { .. }, .. }) => full += 1,
                Err(other) => panic!("unexpected failure {:?}", other),
            }
        }

        assert_eq!(confirmed, 5);
        assert_eq!(full, 15);
        assert_eq!(h.store.len(), 5);
        assert_eq!(h.reserved().await, 5);
        assert_eq!(h.cases().len(), 15);
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried_with_same_key() {
        let h = Harness::with_policies(10, RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2)), 1);
        let attempt = h.attempt("male", "Ravi");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        h.store.fail_next_creates(2);
        let confirmation = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert_eq!(h.store.create_calls(), 3);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert_eq!(confirmation.booking.order_handle, pending.order.id);
        assert!(h.cases().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_write_retries_release_seat_and_escalate() {
        let h = Harness::with_policies(10, RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)), 1);
        let attempt = h.attempt("female", "Isha");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        h.store.fail_next_creates(10);
        let failure = h.orchestrator.confirm(attempt, completion).await.unwrap_err();

        assert_eq!(failure.stage, BookingStage::Rejected);
        let reference = match &failure.error {
            BookingError::ReconciliationRequired { kind: ReconciliationKind::PersistenceFailed, reference } => {
                reference.clone()
            }
            other => panic!("expected reconciliation, got {:?}", other),
        };
        assert_eq!(h.store.create_calls(), 3);
        assert!(h.store.is_empty());
        assert_eq!(h.reserved().await, 0);

        let cases = h.cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].kind, ReconciliationKind::PersistenceFailed);
        assert_eq!(cases[0].reference, reference);
    }

    #[tokio::test]
    async fn test_duplicate_completion_books_once() {
        let h = Harness::new(10);
        let attempt = h.attempt("male", "Neel");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        let first = h.orchestrator.confirm(attempt.clone(), completion.clone()).await.unwrap();
        let second = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert!(second.notification.is_none());
        assert_eq!(first.booking.id, second.booking.id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);

        first.notification.unwrap().wait().await.unwrap();
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_write_committed_before_lost_reply_keeps_its_seat() {
        let h = Harness::with_policies(1, RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)), 1);
        let attempt = h.attempt("male", "Kabir");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        // First write lands, the reply is lost, the retry hits its own row.
        h.store.lose_next_replies(1);
        let confirmation = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert!(!confirmation.replayed);
        assert_eq!(h.store.create_calls(), 2);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert!(h.cases().is_empty());

        let report = confirmation.notification.unwrap().wait().await.unwrap();
        assert_eq!(report.email, Ok(()));
    }

    #[tokio::test]
    async fn test_write_error_after_commit_is_not_compensated() {
        let h = Harness::with_policies(1, RetryPolicy::no_retry(), 1);
        let attempt = h.attempt("male", "Kabir");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        h.store.lose_next_replies(1);
        let confirmation = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert!(!confirmation.replayed);
        assert_eq!(h.store.create_calls(), 1);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert!(h.cases().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_write_after_reservation_returns_seat() {
        let h = Harness::new(10);
        let attempt = h.attempt("male", "Neel");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        let first = h.orchestrator.confirm(attempt.clone(), completion.clone()).await.unwrap();

        // The second submission misses the stored row and reserves a seat.
        h.store.hide_next_lookups(1);
        let second = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.booking.id, first.booking.id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert!(h.cases().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_racing_for_last_seat_is_not_reported_full() {
        let h = Harness::new(1);
        let attempt = h.attempt("male", "Neel");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        let first = h.orchestrator.confirm(attempt.clone(), completion.clone()).await.unwrap();

        // The row stays invisible to the pre-check and to the first re-read.
        h.store.hide_next_lookups(2);
        let second = h.orchestrator.confirm(attempt, completion).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.booking.id, first.booking.id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert!(h.cases().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_checkout_requires_attempt_id() {
        let h = Harness::new(10);
        let mut attempt = h.attempt("volunteer", "Meera");
        attempt.attempt_id = None;

        let failure = h.orchestrator.checkout(attempt).await.unwrap_err();
        match &failure.error {
            BookingError::Validation(fields) => assert_eq!(fields[0].field, "attempt_id"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(h.store.is_empty());
        assert_eq!(h.reserved().await, 0);
    }

    #[tokio::test]
    async fn test_paid_checkout_without_attempt_id_gets_one() {
        let h = Harness::new(10);
        let mut attempt = h.attempt("male", "Arjun");
        attempt.attempt_id = None;

        let pending = h.checkout_paid(&attempt).await;
        assert_eq!(pending.order.notes.get("attempt_id"), Some(&pending.attempt_id.to_string()));
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_undo_booking() {
        let h = Harness::new(10);
        h.mailer.fail_next_sends(100);
        let attempt = h.attempt("female", "Tara");
        let pending = h.checkout_paid(&attempt).await;
        let completion = h.gateway.complete_payment(&pending.order.id);

        let confirmation = h.orchestrator.confirm(attempt, completion).await.unwrap();
        let report = confirmation.notification.unwrap().wait().await.unwrap();

        assert!(report.email.is_err());
        assert_eq!(h.mailer.attempts(), 2);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.reserved().await, 1);
        assert!(h.cases().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_details_stop_before_gateway() {
        let h = Harness::new(10);
        let mut attempt = h.attempt("male", "Sam");
        attempt.email = Masked("not-an-email".to_string());
        attempt.terms_accepted = false;

        let failure = h.orchestrator.checkout(attempt).await.unwrap_err();
        assert_eq!(failure.stage, BookingStage::CollectingDetails);
        match failure.error {
            BookingError::Validation(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert!(fields.contains(&"email"));
                assert!(fields.contains(&"terms_accepted"));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
        assert!(h.gateway.receipts().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_rejection_surfaces_as_retry() {
        let h = Harness::new(10);
        h.gateway.fail_next(GatewayError::Rejected { status: 400, message: "bad request".to_string() });

        let failure = h.orchestrator.checkout(h.attempt("male", "Om")).await.unwrap_err();
        assert_eq!(failure.stage, BookingStage::CollectingDetails);
        assert!(matches!(failure.error, BookingError::Gateway(_)));
        assert_eq!(failure.error.user_message(), "Payment failed, please try again");
        assert_eq!(h.gateway.order_count(), 0);
        assert_eq!(h.gateway.receipts().len(), 1);
    }
}
