pub mod booking;
pub mod payment;
pub mod signature;
pub mod repository;
pub mod notify;
pub mod reconciliation;
pub mod memory;

pub use booking::{Booking, BookingId, BookingStatus, ContactDetails, IdempotencyKey, NO_PAYMENT_HANDLE};
pub use payment::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentCompletion, PaymentGateway};
pub use signature::SignatureVerifier;
pub use repository::{BookingStore, CapacityLedger, EventCatalog, LedgerError, SeatReservation, StoreError};
pub use notify::{BookingSnapshot, EmailMessage, Mailer, NotifyError};
pub use reconciliation::{LogReconciliationSink, ReconciliationCase, ReconciliationKind, ReconciliationSink};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
