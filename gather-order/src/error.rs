use gather_core::{GatewayError, ReconciliationKind};
use uuid::Uuid;

use crate::flow::{BookingStage, FlowError};
use crate::validation::FieldError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Booking details are invalid")]
    Validation(Vec<FieldError>),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Unknown rate category: {0}")]
    UnknownCategory(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Payment signature mismatch for order {order_id}")]
    NotAuthentic { order_id: String, payment_id: String },

    #[error("Order {order_id} does not match the booking: {reason}")]
    OrderMismatch { order_id: String, reason: String },

    #[error("Event {event_id} is full")]
    EventFull {
        event_id: Uuid,
        /// Set when the customer was already charged
        reference: Option<String>,
    },

    #[error("Booking needs manual reconciliation ({kind}), reference {reference}")]
    ReconciliationRequired { kind: ReconciliationKind, reference: String },

    #[error("Booking backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl BookingError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation",
            BookingError::EventNotFound(_) => "event_not_found",
            BookingError::UnknownCategory(_) => "unknown_category",
            BookingError::Gateway(_) => "gateway",
            BookingError::NotAuthentic { .. } => "not_authentic",
            BookingError::OrderMismatch { .. } => "order_mismatch",
            BookingError::EventFull { .. } => "event_full",
            BookingError::ReconciliationRequired { .. } => "reconciliation",
            BookingError::Unavailable(_) => "unavailable",
            BookingError::Flow(_) => "flow",
        }
    }

    /// The one message the customer sees.
    pub fn user_message(&self) -> String {
        match self {
            BookingError::Validation(errors) => errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "Please check your booking details".to_string()),
            BookingError::EventNotFound(_) => "This event is no longer available".to_string(),
            BookingError::UnknownCategory(_) => "Please choose a valid ticket category".to_string(),
            BookingError::Gateway(_)
            | BookingError::NotAuthentic { .. }
            | BookingError::OrderMismatch { .. } => {
                "Payment failed, please try again".to_string()
            }
            BookingError::EventFull { reference: None, .. } => {
                "Sorry, this event is full".to_string()
            }
            BookingError::EventFull { reference: Some(reference), .. } => format!(
                "Sorry, this event filled up while your payment was processing. \
                 Please contact support for a refund with reference {}",
                reference
            ),
            BookingError::ReconciliationRequired { reference, .. } => format!(
                "We couldn't complete your booking, please contact support with reference {}",
                reference
            ),
            BookingError::Unavailable(_) | BookingError::Flow(_) => {
                "Something went wrong, please try again".to_string()
            }
        }
    }
}

/// A failed attempt together with the stage the flow ended in.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error} (stage {stage})")]
pub struct BookingFailure {
    pub stage: BookingStage,
    pub error: BookingError,
}

impl BookingFailure {
    pub fn new(stage: BookingStage, error: impl Into<BookingError>) -> Self {
        Self { stage, error: error.into() }
    }
}
