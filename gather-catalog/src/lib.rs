pub mod event;
pub mod pricing;
pub mod capacity;

pub use event::{CategoryRate, Event, RateCategory, Schedule, Venue};
pub use pricing::{format_amount, Price};
pub use capacity::{CapacityError, CapacitySnapshot};

/// Catalog-level errors (bad admin input, unknown categories)
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown rate category: {0}")]
    UnknownCategory(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}
