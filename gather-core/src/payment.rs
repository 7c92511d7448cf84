use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order creation request as sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateOrderRequest {
    /// Minor currency units (paise, cents)
    pub amount: i64,
    pub currency: String,
    /// Single-use; a retried request must carry a fresh receipt.
    pub receipt: String,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

/// Gateway-side order, as echoed back on creation or fetched for reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

/// Fields the gateway hands back to the client after checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletion {
    #[serde(alias = "order_id")]
    pub order_id: String,
    #[serde(alias = "payment_id")]
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Payment gateway timed out")]
    Timeout,
    #[error("Payment gateway unreachable: {0}")]
    Transport(String),
    #[error("Payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Payment gateway credentials rejected: {0}")]
    Unauthorized(String),
    #[error("Unexpected payment gateway response: {0}")]
    InvalidResponse(String),
    #[error("Invalid order request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Only network-level failures are worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Transport(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an order with the provider. One remote call, no local state.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Read an order back, used to cross-check amounts at verification time
    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError>;
}
