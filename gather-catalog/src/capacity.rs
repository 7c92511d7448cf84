use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::RateCategory;

/// Per-event seat accounting: one counter per category, one shared ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub max_capacity: u32,
    pub participants: BTreeMap<RateCategory, u32>,
}

impl CapacitySnapshot {
    pub fn new(max_capacity: u32, participants: impl IntoIterator<Item = (RateCategory, u32)>) -> Self {
        Self {
            max_capacity,
            participants: participants.into_iter().collect(),
        }
    }

    pub fn total(&self) -> u32 {
        self.participants.values().sum()
    }

    pub fn remaining(&self) -> u32 {
        self.max_capacity.saturating_sub(self.total())
    }

    pub fn count(&self, category: &RateCategory) -> Option<u32> {
        self.participants.get(category).copied()
    }

    /// Conditional increment: only succeeds if the new total stays within `max_capacity`.
    pub fn admit(&mut self, category: &RateCategory) -> Result<u32, CapacityError> {
        let total = self.total();
        let max = self.max_capacity;
        let slot = self
            .participants
            .get_mut(category)
            .ok_or_else(|| CapacityError::UnknownCategory(category.to_string()))?;

        if total + 1 > max {
            return Err(CapacityError::Full { max_capacity: max });
        }

        *slot += 1;
        Ok(*slot)
    }

    /// Undo one `admit`. Never goes below zero.
    pub fn release(&mut self, category: &RateCategory) -> Result<u32, CapacityError> {
        let slot = self
            .participants
            .get_mut(category)
            .ok_or_else(|| CapacityError::UnknownCategory(category.to_string()))?;

        if *slot == 0 {
            return Err(CapacityError::NothingToRelease(category.to_string()));
        }

        *slot -= 1;
        Ok(*slot)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Event is full ({max_capacity} seats)")]
    Full { max_capacity: u32 },

    #[error("Unknown rate category: {0}")]
    UnknownCategory(String),

    #[error("No reserved seat to release in category {0}")]
    NothingToRelease(String),
}
