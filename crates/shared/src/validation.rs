use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Age,
}

/// Field-level input rejection. Display text is the exact message shown
/// inline next to the field; it never blocks the keystroke from being stored
/// and never reaches the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Only alphabetical letters are allowed!")]
    NameNotAlphabetic,
    #[error("Only numeric characters are allowed!")]
    AgeNotNumeric,
    #[error("The age must be in the range 1-100!")]
    AgeOutOfRange,
}

const MAX_AGE: u32 = 100;

/// Pure field validator: same input, same answer. Empty values are valid for
/// both fields.
pub fn validate(field: Field, raw: &str) -> Option<ValidationError> {
    let value = raw.trim();
    match field {
        Field::Name => {
            if value.chars().all(|c| c.is_ascii_alphabetic()) {
                None
            } else {
                Some(ValidationError::NameNotAlphabetic)
            }
        }
        Field::Age => {
            if value.is_empty() {
                return None;
            }
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return Some(ValidationError::AgeNotNumeric);
            }
            match value.parse::<u32>() {
                Ok(age) if age <= MAX_AGE => None,
                // Overflowing digit strings are out of range too.
                _ => Some(ValidationError::AgeOutOfRange),
            }
        }
    }
}
