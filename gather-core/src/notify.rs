use async_trait::async_trait;
use gather_catalog::{Schedule, Venue};
use gather_shared::Masked;
use serde::{Deserialize, Serialize};

use crate::booking::Booking;

/// Everything a confirmation needs, captured at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub booking: Booking,
    pub schedule: Schedule,
    pub venue: Venue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Masked<String>,
    pub to_name: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Mail transport is not configured")]
    NotConfigured,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Mail transport error: {0}")]
    Transport(String),
    #[error("Mail send timed out")]
    TimedOut,
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::Transport(_) | NotifyError::TimedOut)
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}
