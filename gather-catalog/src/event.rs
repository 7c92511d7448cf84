use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::capacity::CapacitySnapshot;
use crate::pricing::Price;
use crate::CatalogError;

/// Rate category key, e.g. "male" / "female" or "standard" / "student".
/// Normalized to trimmed lowercase so lookups are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RateCategory(String);

impl RateCategory {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RateCategory {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for RateCategory {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<RateCategory> for String {
    fn from(value: RateCategory) -> Self {
        value.0
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Free text as entered by the admin ("3 hours", "2 days").
    pub duration: String,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({})",
            self.date.format("%a, %d %b %Y"),
            self.start_time.format("%H:%M"),
            self.duration
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Venue {
    pub name: String,
    pub address: String,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.name, self.address)
    }
}

/// Price and live participant count of one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRate {
    pub category: RateCategory,
    pub price: Price,
    pub participants: u32,
}

/// A bookable event as seen by the booking pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub schedule: Schedule,
    pub venue: Venue,
    pub max_capacity: u32,
    pub categories: Vec<CategoryRate>,
}

impl Event {
    pub fn rate(&self, category: &RateCategory) -> Result<&CategoryRate, CatalogError> {
        self.categories
            .iter()
            .find(|r| &r.category == category)
            .ok_or_else(|| CatalogError::UnknownCategory(category.to_string()))
    }

    pub fn price(&self, category: &RateCategory) -> Result<&Price, CatalogError> {
        self.rate(category).map(|r| &r.price)
    }

    pub fn capacity(&self) -> CapacitySnapshot {
        CapacitySnapshot::new(
            self.max_capacity,
            self.categories
                .iter()
                .map(|r| (r.category.clone(), r.participants)),
        )
    }

    pub fn remaining_seats(&self) -> u32 {
        self.capacity().remaining()
    }

    /// Checks the shape admins are allowed to save.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::InvalidEvent("title is required".to_string()));
        }
        if self.max_capacity == 0 {
            return Err(CatalogError::InvalidEvent(
                "max capacity must be at least 1".to_string(),
            ));
        }
        if self.categories.is_empty() {
            return Err(CatalogError::InvalidEvent(
                "at least one rate category is required".to_string(),
            ));
        }
        for (i, rate) in self.categories.iter().enumerate() {
            if rate.category.as_str().is_empty() {
                return Err(CatalogError::InvalidEvent("category name is empty".to_string()));
            }
            if self.categories[..i].iter().any(|r| r.category == rate.category) {
                return Err(CatalogError::InvalidEvent(format!(
                    "duplicate category {}",
                    rate.category
                )));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_lookup_is_case_insensitive() {
        let event = fixtures::event(10);
        let price = event.price(&RateCategory::new(" Male ")).unwrap();
        assert_eq!(price, &Price::fixed(50_000));
        assert!(matches!(
            event.price(&RateCategory::new("child")),
            Err(CatalogError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_remaining_seats_counts_all_categories() {
        let mut event = fixtures::event(10);
        event.categories[0].participants = 3;
        event.categories[1].participants = 4;
        assert_eq!(event.remaining_seats(), 3);
    }

    #[test]
    fn test_validate_rejects_duplicate_categories() {
        let mut event = fixtures::event(10);
        event.categories[1].category = RateCategory::new("MALE");
        assert!(event.validate().is_err());

        let event = fixtures::event(0);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_schedule_display() {
        let event = fixtures::event(1);
        assert_eq!(event.schedule.to_string(), "Sat, 14 Nov 2026 at 05:30 (4 hours)");
    }
}
