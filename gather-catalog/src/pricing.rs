use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CatalogError;

/// Price of one rate category.
///
/// Admins type prices as free text. Anything that reads as a positive decimal
/// amount becomes `Fixed` (stored in minor units); anything else ("Free",
/// "Invite only", "Coming soon") is a `Placeholder` and is booked without payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Price {
    Fixed { amount_minor: i64 },
    Placeholder { label: String },
}

impl Price {
    pub fn fixed(amount_minor: i64) -> Self {
        Price::Fixed { amount_minor }
    }

    pub fn placeholder(label: impl Into<String>) -> Self {
        Price::Placeholder { label: label.into() }
    }

    /// Parse an admin-entered price.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidPrice("price is empty".to_string()));
        }

        match parse_decimal_minor(trimmed) {
            Some(amount) if amount > 0 => Ok(Price::Fixed { amount_minor: amount }),
            Some(_) => Err(CatalogError::InvalidPrice(format!(
                "numeric price must be positive, got {}",
                trimmed
            ))),
            None => Ok(Price::Placeholder { label: trimmed.to_string() }),
        }
    }

    pub fn amount_minor(&self) -> Option<i64> {
        match self {
            Price::Fixed { amount_minor } => Some(*amount_minor),
            Price::Placeholder { .. } => None,
        }
    }

    pub fn requires_payment(&self) -> bool {
        matches!(self, Price::Fixed { .. })
    }

    /// Human readable form used in confirmations.
    pub fn display(&self, currency: &str) -> String {
        match self {
            Price::Fixed { amount_minor } => format_amount(*amount_minor, currency),
            Price::Placeholder { label } => label.clone(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Fixed { amount_minor } => {
                write!(f, "{}.{:02}", amount_minor / 100, amount_minor % 100)
            }
            Price::Placeholder { label } => write!(f, "{}", label),
        }
    }
}

/// "INR 500.00"
pub fn format_amount(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{} {}{}.{:02}", currency, sign, abs / 100, abs % 100)
}

// Accepts "500", "1,500", "499.5", "499.50". Returns minor units.
fn parse_decimal_minor(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let (major, minor) = match cleaned.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (cleaned.as_str(), ""),
    };

    if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let major: i64 = major.parse().ok()?;
    let minor: i64 = match minor.len() {
        0 => 0,
        1 => minor.parse::<i64>().ok()? * 10,
        _ => minor.parse().ok()?,
    };

    major.checked_mul(100)?.checked_add(minor)
}
