//! Input validation mirroring the store's format and range checks.
//!
//! The store remains authoritative; these functions give callers the same
//! answer before a round trip.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid email format.
    InvalidEmail(String),
    /// Invalid Moroccan phone number.
    InvalidPhone(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Number outside its allowed range.
    OutOfRange { field: String, min: i64, max: i64, actual: i64 },
    /// Empty value where one is required.
    Empty(String),
    /// Not a `YYYY-MM-DDTHH:MM:SS.sssZ` UTC timestamp.
    InvalidTimestamp { field: String, value: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(msg) => write!(f, "Invalid email: {}", msg),
            ValidationError::InvalidPhone(msg) => write!(f, "Invalid phone: {}", msg),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::OutOfRange { field, min, max, actual } => {
                write!(f, "{} must be between {} and {} (got {})", field, min, max, actual)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::InvalidTimestamp { field, value } => write!(
                f,
                "{} must be a UTC timestamp like 2025-01-31T09:30:00.000Z (got {:?})",
                field, value
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for email addresses.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Bounds of a qualification score.
pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

/// Validate an email address.
///
/// Accepts `local@domain.tld` where:
/// - local is one or more of `A-Z a-z 0-9 . _ % + -`
/// - domain is one or more of `A-Z a-z 0-9 . -`
/// - tld is two or more letters after the last dot
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::Empty("email".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) if !parts.1.contains('@') => parts,
        _ => {
            return Err(ValidationError::InvalidEmail(
                "must contain exactly one @ symbol".to_string(),
            ))
        }
    };

    if local.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "missing local part (before @)".to_string(),
        ));
    }

    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return Err(ValidationError::InvalidEmail(
            "invalid character in local part".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ValidationError::InvalidEmail(
            "invalid character in domain".to_string(),
        ));
    }

    let (host, tld) = match domain.rsplit_once('.') {
        Some(parts) => parts,
        None => {
            return Err(ValidationError::InvalidEmail(
                "domain must contain at least one dot".to_string(),
            ))
        }
    };

    if host.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "missing host before top-level domain".to_string(),
        ));
    }

    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidEmail(
            "top-level domain must be at least two letters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a Moroccan phone number: `+212` or `0`, then a digit in 5-7,
/// then eight more digits.
pub fn validate_moroccan_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.is_empty() {
        return Err(ValidationError::Empty("phone".to_string()));
    }

    let rest = phone
        .strip_prefix("+212")
        .or_else(|| phone.strip_prefix('0'))
        .ok_or_else(|| ValidationError::InvalidPhone("must start with +212 or 0".to_string()))?;

    let mut digits = rest.chars();
    match digits.next() {
        Some('5'..='7') => {}
        _ => {
            return Err(ValidationError::InvalidPhone(
                "subscriber number must start with 5, 6 or 7".to_string(),
            ))
        }
    }

    let tail: Vec<char> = digits.collect();
    if tail.len() != 8 || !tail.iter().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone(
            "expected 9 digits after the prefix".to_string(),
        ));
    }

    Ok(())
}

/// Validate a qualification score.
pub fn validate_score(score: i64) -> Result<(), ValidationError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ValidationError::OutOfRange {
            field: "qualification_score".to_string(),
            min: MIN_SCORE,
            max: MAX_SCORE,
            actual: score,
        });
    }
    Ok(())
}

/// Validate that a required text field is not blank.
pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }
    Ok(())
}

/// Validate a stored timestamp: `YYYY-MM-DDTHH:MM:SS.sssZ`, UTC, with
/// millisecond precision and a real calendar date.
pub fn validate_timestamp(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    if bytes.len() != 24 {
        return Err(invalid());
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 | 16 => *b == b':',
            19 => *b == b'.',
            23 => *b == b'Z',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return Err(invalid());
        }
    }

    let number = |range: std::ops::Range<usize>| {
        bytes[range]
            .iter()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    };
    let (year, month, day) = (number(0..4), number(5..7), number(8..10));
    let (hour, minute, second) = (number(11..13), number(14..16), number(17..19));

    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => return Err(invalid()),
    };

    if day == 0 || day > days_in_month || hour > 23 || minute > 59 || second > 59 {
        return Err(invalid());
    }

    Ok(())
}
