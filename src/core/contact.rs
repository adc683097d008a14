//! Contact-form validation and phone formatting

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref RE_NON_DIGIT: Regex = Regex::new(r"\D").unwrap();
}

/// Minimum digits for a submittable phone number
pub const MIN_PHONE_DIGITS: usize = 10;

/// Contact validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ContactError {
    /// Name is empty after trimming
    E401_NAME_EMPTY,
    /// Phone has fewer than 10 digits
    E402_PHONE_TOO_SHORT,
}

impl ContactError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::E401_NAME_EMPTY => "E401_NAME_EMPTY",
            Self::E402_PHONE_TOO_SHORT => "E402_PHONE_TOO_SHORT",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::E401_NAME_EMPTY => "Name must not be empty",
            Self::E402_PHONE_TOO_SHORT => "Phone must contain at least 10 digits",
        }
    }
}

impl std::fmt::Display for ContactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Strip everything but digits
pub fn digits(phone: &str) -> String {
    RE_NON_DIGIT.replace_all(phone, "").into_owned()
}

/// Validate a submission; returns the trimmed name and formatted phone
pub fn validate_contact(name: &str, phone: &str) -> Result<(String, String), ContactError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContactError::E401_NAME_EMPTY);
    }
    if digits(phone).len() < MIN_PHONE_DIGITS {
        return Err(ContactError::E402_PHONE_TOO_SHORT);
    }
    Ok((name.to_string(), format_phone(phone)))
}

/// Progressive display formatting: (123) 456-7890
pub fn format_phone(phone: &str) -> String {
    let digits = digits(phone);
    match digits.len() {
        0..=3 => digits,
        4..=6 => format!("({}) {}", &digits[..3], &digits[3..]),
        _ => {
            let tail_end = digits.len().min(10);
            format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..tail_end])
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
