use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, NaiveTime};
use gather_api::{
    app,
    metrics::{CountingReconciliationSink, Metrics},
    middleware::ResiliencyState,
    state::{AppState, AuthConfig},
};
use gather_catalog::{CategoryRate, Event, Price, Schedule, Venue};
use gather_core::memory::{InMemoryBookingStore, InMemoryEvents, MockPaymentGateway, RecordingMailer};
use gather_core::{LogReconciliationSink, PaymentCompletion, SignatureVerifier};
use gather_order::{
    BookingBackends, BookingOrchestrator, NotificationDispatcher, NotificationSettings, OrchestratorSettings,
    OrderService, RetryPolicy,
};
use gather_shared::Masked;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";
const ADMIN_PASSWORD: &str = "correct horse battery";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentGateway>,
    store: Arc<InMemoryBookingStore>,
    event_id: Uuid,
}

fn test_app(max_capacity: u32) -> TestApp {
    let events = Arc::new(InMemoryEvents::new());
    let event = Event {
        id: Uuid::new_v4(),
        title: "Sunrise Trek".to_string(),
        schedule: Schedule {
            date: NaiveDate::from_ymd_opt(2026, 11, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(5, 30, 0).unwrap(),
            duration: "4 hours".to_string(),
        },
        venue: Venue {
            name: "Base Camp".to_string(),
            address: "Hill Road".to_string(),
        },
        max_capacity,
        categories: vec![
            CategoryRate { category: "male".into(), price: Price::fixed(50_000), participants: 0 },
            CategoryRate { category: "volunteer".into(), price: Price::placeholder("Free for crew"), participants: 0 },
        ],
    };
    let event_id = event.id;
    events.insert(event);

    let store = Arc::new(InMemoryBookingStore::new());
    let gateway = Arc::new(MockPaymentGateway::new(SECRET));
    let metrics = Arc::new(Metrics::new().unwrap());

    let orchestrator = BookingOrchestrator::new(
        BookingBackends {
            catalog: events.clone(),
            ledger: events.clone(),
            store: store.clone(),
            reconciliation: Arc::new(CountingReconciliationSink::new(
                metrics.clone(),
                Arc::new(LogReconciliationSink),
            )),
        },
        OrderService::new(gateway.clone(), "INR", Duration::from_secs(1)),
        SignatureVerifier::new(SECRET).unwrap(),
        NotificationDispatcher::new(
            Arc::new(RecordingMailer::new()),
            NotificationSettings {
                chat_phone: "+91 90000 00000".to_string(),
                email_timeout: Duration::from_millis(200),
                email_policy: RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
            },
        ),
        OrchestratorSettings {
            persist_policy: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            duplicate_policy: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
        },
    );

    let state = AppState {
        db: None,
        redis: None,
        kafka: None,
        catalog: events.clone(),
        ledger: events,
        bookings: store.clone(),
        orchestrator: Arc::new(orchestrator),
        metrics,
        resiliency: Arc::new(ResiliencyState::default()),
        auth: AuthConfig {
            secret: Masked("integration-jwt-secret".to_string()),
            expiration: 600,
            admin_password: Masked(ADMIN_PASSWORD.to_string()),
        },
        gateway_key_id: "rzp_test_key".to_string(),
        rate_limit_per_minute: 60,
    };

    TestApp {
        router: app(state),
        gateway,
        store,
        event_id,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn attempt(event_id: Uuid, category: &str, name: &str) -> Value {
    json!({
        "attempt_id": Uuid::new_v4(),
        "event_id": event_id,
        "category": category,
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "phone": "9876543210",
        "age": 30,
        "terms_accepted": true
    })
}

async fn checkout_paid(t: &TestApp, attempt: &Value) -> PaymentCompletion {
    let (status, body) = send(&t.router, "POST", "/v1/bookings/checkout", Some(attempt.clone()), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "AWAITING_PAYMENT");
    let order_id = body["orderId"].as_str().unwrap();
    t.gateway.complete_payment(order_id)
}

#[tokio::test]
async fn test_health_reports_in_memory_backends() {
    let t = test_app(10);
    let (status, body) = send(&t.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "in-memory");
    assert_eq!(body["redis"], "disabled");
}

#[tokio::test]
async fn test_events_list_shows_remaining_seats_and_prices() {
    let t = test_app(10);
    let (status, body) = send(&t.router, "GET", "/v1/events", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let event = &body[0];
    assert_eq!(event["remainingSeats"], 10);
    assert_eq!(event["categories"][0]["price"], "INR 500.00");
    assert_eq!(event["categories"][1]["requiresPayment"], false);

    let (status, _) = send(&t.router, "GET", &format!("/v1/events/{}", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_order_and_verify_signature() {
    let t = test_app(10);
    let (status, body) = send(&t.router, "POST", "/v1/payments/orders", Some(json!({ "amount": 50000 })), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 50000);
    assert_eq!(body["currency"], "INR");

    let completion = t.gateway.complete_payment(body["orderId"].as_str().unwrap());
    let (status, body) = send(&t.router, "POST", "/v1/payments/verify", Some(json!(completion)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    let mut forged = completion.clone();
    forged.signature = "0".repeat(64);
    let (status, body) = send(&t.router, "POST", "/v1/payments/verify", Some(json!(forged)), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment verification failed");
}

#[tokio::test]
async fn test_create_order_rejects_non_positive_amount() {
    let t = test_app(10);
    let (status, _) = send(&t.router, "POST", "/v1/payments/orders", Some(json!({ "amount": 0 })), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_checkout_then_confirm_creates_booking_once() {
    let t = test_app(10);
    let attempt = attempt(t.event_id, "male", "Arjun");
    let completion = checkout_paid(&t, &attempt).await;

    let body = json!({ "attempt": attempt, "payment": completion });
    let (status, first) = send(&t.router, "POST", "/v1/bookings/confirm", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    assert_eq!(first["amount"], "INR 500.00");
    assert_eq!(first["replayed"], false);
    assert!(first["chatLink"].as_str().unwrap().starts_with("https://wa.me/919000000000?text="));
    assert!(first.get("email").is_none());

    let (status, second) = send(&t.router, "POST", "/v1/bookings/confirm", Some(body), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["bookingId"], first["bookingId"]);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn test_confirm_with_bad_signature_is_refused() {
    let t = test_app(10);
    let attempt = attempt(t.event_id, "male", "Arjun");
    let mut completion = checkout_paid(&t, &attempt).await;
    completion.signature = "f".repeat(64);

    let (status, body) = send(
        &t.router,
        "POST",
        "/v1/bookings/confirm",
        Some(json!({ "attempt": attempt, "payment": completion })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "not_authentic");
    assert_eq!(body["error"], "Payment failed, please try again");
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_placeholder_checkout_confirms_without_payment() {
    let t = test_app(10);
    let (status, body) = send(
        &t.router,
        "POST",
        "/v1/bookings/checkout",
        Some(attempt(t.event_id, "volunteer", "Meera")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["amount"], "Free for crew");
    assert_eq!(t.gateway.order_count(), 0);
}

#[tokio::test]
async fn test_placeholder_checkout_without_attempt_id_is_refused() {
    let t = test_app(10);
    let mut body = attempt(t.event_id, "volunteer", "Meera");
    body.as_object_mut().unwrap().remove("attempt_id");

    let (status, body) = send(&t.router, "POST", "/v1/bookings/checkout", Some(body), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0]["field"], "attempt_id");
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_full_event_refuses_checkout() {
    let t = test_app(1);
    let (status, _) = send(
        &t.router,
        "POST",
        "/v1/bookings/checkout",
        Some(attempt(t.event_id, "volunteer", "Meera")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &t.router,
        "POST",
        "/v1/bookings/checkout",
        Some(attempt(t.event_id, "male", "Arjun")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Sorry, this event is full");
}

#[tokio::test]
async fn test_invalid_details_report_field_errors() {
    let t = test_app(10);
    let mut bad = attempt(t.event_id, "male", "Arjun");
    bad["email"] = json!("not-an-email");
    let (status, body) = send(&t.router, "POST", "/v1/bookings/checkout", Some(bad), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_admin_routes_require_a_session() {
    let t = test_app(10);
    let (status, _) = send(&t.router, "GET", "/v1/admin/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.router, "POST", "/v1/admin/session", Some(json!({ "password": "guess" })), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, session) =
        send(&t.router, "POST", "/v1/admin/session", Some(json!({ "password": ADMIN_PASSWORD })), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["expiresIn"], 600);
    let token = session["token"].as_str().unwrap().to_string();

    let (status, bookings) = send(&t.router, "GET", "/v1/admin/bookings", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bookings, json!([]));

    let (status, _) = send(&t.router, "GET", "/v1/admin/bookings", None, Some("not.a.token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_updates_event() {
    let t = test_app(10);
    let (_, session) =
        send(&t.router, "POST", "/v1/admin/session", Some(json!({ "password": ADMIN_PASSWORD })), None).await;
    let token = session["token"].as_str().unwrap().to_string();

    let update = json!({
        "title": "Sunrise Trek",
        "date": "2026-11-14",
        "start_time": "05:30:00",
        "duration": "4 hours",
        "venue_name": "Base Camp",
        "venue_address": "Hill Road",
        "max_capacity": 25,
        "categories": [
            { "category": "male", "price": "550" },
            { "category": "volunteer", "price": "Free for crew" }
        ]
    });
    let uri = format!("/v1/admin/events/{}", t.event_id);
    let (status, body) = send(&t.router, "PUT", &uri, Some(update), Some(&token)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["maxCapacity"], 25);
    assert_eq!(body["categories"][0]["price"], "INR 550.00");
}

#[tokio::test]
async fn test_metrics_count_booking_outcomes() {
    let t = test_app(10);
    send(
        &t.router,
        "POST",
        "/v1/bookings/checkout",
        Some(attempt(t.event_id, "volunteer", "Meera")),
        None,
    )
    .await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = t.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("gather_booking_outcomes_total{outcome=\"confirmed\"} 1"));
}
