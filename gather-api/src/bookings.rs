use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use gather_core::PaymentCompletion;
use gather_order::{BookingAttempt, BookingError, BookingFailure, Checkout, Confirmation, PendingPayment};
use gather_shared::models::events::BookingConfirmedEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub attempt: BookingAttempt,
    pub payment: PaymentCompletion,
}

/// What the confirmation screen shows. Contact details stay out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub booking_id: String,
    pub event_id: Uuid,
    pub event_title: String,
    pub category: String,
    pub amount: String,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub customer_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub chat_link: String,
    pub replayed: bool,
}

impl From<&Confirmation> for BookingView {
    fn from(c: &Confirmation) -> Self {
        let b = &c.booking;
        Self {
            booking_id: b.id.to_string(),
            event_id: b.event_id,
            event_title: b.event_title.clone(),
            category: b.category.to_string(),
            amount: b.amount.display(&b.currency),
            amount_minor: b.amount.amount_minor(),
            currency: b.currency.clone(),
            customer_name: b.customer.name.clone(),
            status: b.status.to_string(),
            created_at: b.created_at,
            chat_link: c.chat_link.clone(),
            replayed: c.replayed,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStep {
    pub attempt_id: Uuid,
    pub event_id: Uuid,
    pub category: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub amount_display: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutResponse {
    AwaitingPayment(PaymentStep),
    Confirmed(BookingView),
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/checkout", post(checkout))
        .route("/v1/bookings/confirm", post(confirm))
}

async fn checkout(
    State(state): State<AppState>,
    Json(attempt): Json<BookingAttempt>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    match state.orchestrator.checkout(attempt).await {
        Ok(Checkout::AwaitingPayment(pending)) => {
            state.metrics.gateway_order("created");
            Ok((StatusCode::OK, Json(CheckoutResponse::AwaitingPayment(payment_step(&state, pending)))))
        }
        Ok(Checkout::Confirmed(confirmation)) => {
            let view = finish(&state, confirmation);
            Ok((StatusCode::CREATED, Json(CheckoutResponse::Confirmed(view))))
        }
        Err(failure) => Err(refuse(&state, failure)),
    }
}

async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    match state.orchestrator.confirm(body.attempt, body.payment).await {
        Ok(confirmation) => {
            let status = if confirmation.replayed { StatusCode::OK } else { StatusCode::CREATED };
            Ok((status, Json(finish(&state, confirmation))))
        }
        Err(failure) => Err(refuse(&state, failure)),
    }
}

fn payment_step(state: &AppState, pending: PendingPayment) -> PaymentStep {
    PaymentStep {
        attempt_id: pending.attempt_id,
        event_id: pending.event_id,
        category: pending.category.to_string(),
        order_id: pending.order.id,
        amount: pending.order.amount,
        currency: pending.order.currency,
        amount_display: pending.amount_display,
        key_id: state.gateway_key_id.clone(),
    }
}

fn finish(state: &AppState, confirmation: Confirmation) -> BookingView {
    let view = BookingView::from(&confirmation);
    if confirmation.replayed {
        state.metrics.booking_outcome("replayed");
        return view;
    }
    state.metrics.booking_outcome("confirmed");

    if let Some(kafka) = state.kafka.clone() {
        let b = &confirmation.booking;
        let event = BookingConfirmedEvent {
            booking_id: b.id.to_string(),
            event_id: b.event_id,
            category: b.category.to_string(),
            amount_minor: b.amount.amount_minor(),
            currency: b.currency.clone(),
            order_handle: b.order_handle.clone(),
            payment_handle: b.payment_handle.clone(),
            timestamp: b.created_at.timestamp(),
        };
        tokio::spawn(async move { kafka.booking_confirmed(&event).await });
    }
    // The e-mail task keeps running after its handle is dropped.
    view
}

fn refuse(state: &AppState, failure: BookingFailure) -> AppError {
    if matches!(failure.error, BookingError::Gateway(_)) {
        state.metrics.gateway_order("failed");
    }
    state.metrics.booking_outcome(failure.error.kind());
    AppError::Booking(failure)
}
