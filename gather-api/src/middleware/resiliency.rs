use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    /// Failing fast until `reset_timeout` has passed.
    Open,
    /// One probe request is let through.
    HalfOpen,
}

pub struct CircuitBreaker {
    pub name: String,
    pub state: RwLock<CircuitState>,
    pub failure_count: AtomicUsize,
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
    pub last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold,
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let last_fail = *self.last_failure.read().await;
                let expired = last_fail.map_or(true, |instant| instant.elapsed() > self.reset_timeout);
                if !expired {
                    return false;
                }
                let mut s = self.state.write().await;
                // Only the caller that flips Open -> HalfOpen gets the probe.
                if *s == CircuitState::Open {
                    *s = CircuitState::HalfOpen;
                    tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                    return true;
                }
                false
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
    }

    pub async fn current(&self) -> CircuitState {
        *self.state.read().await
    }
}

pub struct ResiliencyState {
    /// Guards routes that call the payment gateway.
    pub gateway_cb: CircuitBreaker,
}

impl ResiliencyState {
    pub fn new(threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            gateway_cb: CircuitBreaker::new("payment-gateway", threshold, reset_timeout),
        }
    }
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

fn uses_gateway(path: &str) -> bool {
    matches!(path, "/v1/payments/orders" | "/v1/bookings/checkout" | "/v1/bookings/confirm")
}

/// Only gateway failures (502/504) count against the circuit.
pub async fn circuit_breaker_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> impl IntoResponse {
    if !uses_gateway(req.uri().path()) {
        return next.run(req).await.into_response();
    }

    let cb = &state.resiliency.gateway_cb;
    if !cb.check().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Payment failed, please try again" })),
        )
            .into_response();
    }

    let response = next.run(req).await;
    let status = response.status();
    if status == StatusCode::BAD_GATEWAY || status == StatusCode::GATEWAY_TIMEOUT {
        cb.record_failure().await;
    } else {
        cb.record_success().await;
    }

    response.into_response()
}
