pub mod models;
pub mod validation;
pub mod retry;
pub mod flow;
pub mod error;
pub mod order_service;
pub mod notify;
pub mod orchestrator;

pub use models::{BookingAttempt, ValidatedAttempt};
pub use validation::{validate_attempt, FieldError};
pub use retry::RetryPolicy;
pub use flow::{BookingFlow, BookingStage, FlowError};
pub use error::{BookingError, BookingFailure};
pub use order_service::OrderService;
pub use notify::{build_chat_deep_link, NotificationDispatcher, NotificationHandle, NotificationReport, NotificationSettings};
pub use orchestrator::{BookingBackends, BookingOrchestrator, Checkout, Confirmation, OrchestratorSettings, PendingPayment};
