use gather_core::{BookingStore, CapacityLedger, EventCatalog};
use gather_order::BookingOrchestrator;
use gather_shared::Masked;
use gather_store::{DbClient, EventProducer, RedisClient};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
    pub expiration: u64,
    pub admin_password: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    /// `None` when running on in-memory backends.
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisClient>>,
    pub kafka: Option<Arc<EventProducer>>,
    pub catalog: Arc<dyn EventCatalog>,
    pub ledger: Arc<dyn CapacityLedger>,
    pub bookings: Arc<dyn BookingStore>,
    pub orchestrator: Arc<BookingOrchestrator>,
    pub metrics: Arc<Metrics>,
    pub resiliency: Arc<ResiliencyState>,
    pub auth: AuthConfig,
    /// Public key id handed to the browser checkout widget.
    pub gateway_key_id: String,
    pub rate_limit_per_minute: i64,
}
