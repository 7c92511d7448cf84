use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use gather_core::{GatewayError, PaymentCompletion};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    /// Minor units
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub verified: bool,
    pub payment_id: String,
    pub order_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/orders", post(create_order))
        .route("/v1/payments/verify", post(verify_payment))
}

async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderBody>,
) -> Result<Json<CreateOrderResponse>, (StatusCode, Json<serde_json::Value>)> {
    let result = state
        .orchestrator
        .order_service()
        .create_order(body.amount, body.currency.as_deref(), body.receipt, body.notes)
        .await;

    match result {
        Ok(order) => {
            state.metrics.gateway_order("created");
            Ok(Json(CreateOrderResponse {
                order_id: order.id,
                amount: order.amount,
                currency: order.currency,
            }))
        }
        Err(e) => {
            let (status, label) = match &e {
                GatewayError::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid"),
                GatewayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                _ => (StatusCode::BAD_GATEWAY, "failed"),
            };
            state.metrics.gateway_order(label);
            tracing::warn!(amount = body.amount, "Order creation failed: {}", e);
            Err((status, Json(json!({ "error": e.to_string() }))))
        }
    }
}

async fn verify_payment(
    State(state): State<AppState>,
    Json(completion): Json<PaymentCompletion>,
) -> Result<Json<VerifyResponse>, AppError> {
    if !state.orchestrator.verify_completion(&completion) {
        return Err(AppError::BadRequest("Payment verification failed".to_string()));
    }

    Ok(Json(VerifyResponse {
        verified: true,
        payment_id: completion.payment_id,
        order_id: completion.order_id,
    }))
}
