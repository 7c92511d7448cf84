use gather_core::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentGateway};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Creates gateway orders with a bounded timeout and a single retry on
/// transient network failure. Keeps no local state.
pub struct OrderService {
    gateway: Arc<dyn PaymentGateway>,
    default_currency: String,
    timeout: Duration,
}

impl OrderService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, default_currency: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            default_currency: default_currency.into(),
            timeout,
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Receipts are single-use on the gateway side; every call gets a new one.
    pub fn fresh_receipt() -> String {
        format!("rcpt_{}", &Uuid::new_v4().simple().to_string()[..20])
    }

    pub async fn create_order(
        &self,
        amount: i64,
        currency: Option<&str>,
        receipt: Option<String>,
        notes: BTreeMap<String, String>,
    ) -> Result<GatewayOrder, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::InvalidRequest(format!(
                "amount must be a positive number of minor units, got {}",
                amount
            )));
        }

        let currency = match currency.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => c.to_ascii_uppercase(),
            None => self.default_currency.clone(),
        };
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::InvalidRequest(format!("invalid currency code {}", currency)));
        }

        let mut request = CreateOrderRequest {
            amount,
            currency,
            receipt: receipt.unwrap_or_else(Self::fresh_receipt),
            notes,
        };

        let first = self.bounded(self.gateway.create_order(&request)).await;
        let order = match first {
            Err(e) if e.is_transient() => {
                tracing::warn!(receipt = %request.receipt, "Order creation failed transiently, retrying once: {}", e);
                request.receipt = Self::fresh_receipt();
                self.bounded(self.gateway.create_order(&request)).await?
            }
            other => other?,
        };

        tracing::info!(order_id = %order.id, amount = order.amount, currency = %order.currency, "Gateway order created");
        Ok(order)
    }

    /// Reads an order back for verification; same timeout and retry rules.
    pub async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        match self.bounded(self.gateway.fetch_order(order_id)).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(order_id, "Order lookup failed transiently, retrying once: {}", e);
                self.bounded(self.gateway.fetch_order(order_id)).await
            }
            other => other,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, GatewayError>>) -> Result<T, GatewayError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout))
    }
}
