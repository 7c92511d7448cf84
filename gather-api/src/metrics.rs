use async_trait::async_trait;
use gather_core::{ReconciliationCase, ReconciliationSink};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct Metrics {
    registry: Registry,
    pub booking_outcomes: IntCounterVec,
    pub gateway_orders: IntCounterVec,
    pub reconciliation_cases: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let booking_outcomes = IntCounterVec::new(
            Opts::new("gather_booking_outcomes_total", "Booking attempts by final outcome"),
            &["outcome"],
        )?;
        let gateway_orders = IntCounterVec::new(
            Opts::new("gather_gateway_orders_total", "Payment gateway order creations by result"),
            &["result"],
        )?;
        let reconciliation_cases = IntCounterVec::new(
            Opts::new("gather_reconciliation_cases_total", "Cases escalated for manual reconciliation"),
            &["kind"],
        )?;

        registry.register(Box::new(booking_outcomes.clone()))?;
        registry.register(Box::new(gateway_orders.clone()))?;
        registry.register(Box::new(reconciliation_cases.clone()))?;

        Ok(Self {
            registry,
            booking_outcomes,
            gateway_orders,
            reconciliation_cases,
        })
    }

    pub fn booking_outcome(&self, outcome: &str) {
        self.booking_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn gateway_order(&self, result: &str) {
        self.gateway_orders.with_label_values(&[result]).inc();
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counts cases, then hands them to the real sink.
pub struct CountingReconciliationSink {
    metrics: Arc<Metrics>,
    inner: Arc<dyn ReconciliationSink>,
}

impl CountingReconciliationSink {
    pub fn new(metrics: Arc<Metrics>, inner: Arc<dyn ReconciliationSink>) -> Self {
        Self { metrics, inner }
    }
}

#[async_trait]
impl ReconciliationSink for CountingReconciliationSink {
    async fn escalate(&self, case: ReconciliationCase) {
        let kind = case.kind.to_string();
        self.metrics.reconciliation_cases.with_label_values(&[kind.as_str()]).inc();
        self.inner.escalate(case).await;
    }
}
