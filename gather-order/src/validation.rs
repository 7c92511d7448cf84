use gather_core::ContactDetails;
use gather_shared::Masked;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{BookingAttempt, ValidatedAttempt};

const MAX_NAME_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 500;
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Checks every field and reports all problems at once.
pub fn validate_attempt(attempt: &BookingAttempt) -> Result<ValidatedAttempt, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = attempt.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new("name", "Name is too long"));
    }

    let email = attempt.email.expose().trim().to_string();
    if email.is_empty() {
        errors.push(FieldError::new("email", "E-mail is required"));
    } else if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Enter a valid e-mail address"));
    }

    let phone = normalize_phone(attempt.phone.expose());
    if attempt.phone.expose().trim().is_empty() {
        errors.push(FieldError::new("phone", "Phone number is required"));
    } else if phone.is_none() {
        errors.push(FieldError::new(
            "phone",
            format!("Enter a phone number with {}-{} digits", MIN_PHONE_DIGITS, MAX_PHONE_DIGITS),
        ));
    }

    let age = match attempt.age {
        None => {
            errors.push(FieldError::new("age", "Age is required"));
            None
        }
        Some(age) if !(1..=120).contains(&age) => {
            errors.push(FieldError::new("age", "Enter a valid age"));
            None
        }
        Some(age) => u8::try_from(age).ok(),
    };

    let dietary_notes = optional_text("dietary_notes", attempt.dietary_notes.as_deref(), &mut errors);
    let prior_experience =
        optional_text("prior_experience", attempt.prior_experience.as_deref(), &mut errors);

    if !attempt.terms_accepted {
        errors.push(FieldError::new("terms_accepted", "Please accept the terms and conditions"));
    }

    match (errors.is_empty(), phone, age) {
        (true, Some(phone), Some(age)) => Ok(ValidatedAttempt {
            attempt_id: attempt.attempt_id.unwrap_or_else(Uuid::new_v4),
            event_id: attempt.event_id,
            category: attempt.category.clone(),
            customer: ContactDetails {
                name: name.to_string(),
                email: Masked(email.to_lowercase()),
                phone: Masked(phone),
                age,
            },
            dietary_notes,
            prior_experience,
        }),
        _ => Err(errors),
    }
}

fn optional_text(field: &'static str, raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<String> {
    let text = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if text.chars().count() > MAX_NOTES_LEN {
        errors.push(FieldError::new(field, "Text is too long"));
        return None;
    }
    Some(text.to_string())
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty()
                && !l.starts_with('-')
                && !l.ends_with('-')
                && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Strips separators, keeps a leading '+'. Returns None for anything else.
fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return None,
        }
    }

    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        Some(format!("{}{}", plus, digits))
    } else {
        None
    }
}
