// core/common/src/validation.rs
// Input normalization and validation

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid verification code: {0}")]
    InvalidOtpCode(String),
    #[error("Invalid month: {0}")]
    InvalidMonth(String),
    #[error("Required field missing: {0}")]
    MissingField(String),
}

// E.164 caps numbers at 15 digits; local formats go down to 7
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

const MAX_PAYMENT_AMOUNT: f64 = 1_000_000_000.0;

fn non_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\D").expect("static regex"))
}

fn otp_code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4,10}$").expect("static regex"))
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a phone number the way organisations register them.
///
/// Surrounding whitespace is trimmed. A leading `+` is kept and every other
/// non-digit character is removed.
pub fn normalize_phone(phone: &str) -> String {
    let phone = phone.trim();

    match phone.strip_prefix('+') {
        Some(rest) => format!("+{}", non_digits().replace_all(rest, "")),
        None => non_digits().replace_all(phone, "").into_owned(),
    }
}

/// Sanitize string input (remove control characters, limit length)
pub fn sanitize_string(input: &str, max_length: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(max_length)
        .collect()
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Validate an already normalized phone number.
pub fn validate_phone(normalized: &str) -> Result<(), ValidationError> {
    let digits = normalized.trim_start_matches('+');

    if digits.is_empty() {
        return Err(ValidationError::InvalidPhone(
            "no digits found".to_string(),
        ));
    }

    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return Err(ValidationError::InvalidPhone(format!(
            "must contain between {} and {} digits",
            MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
        )));
    }

    Ok(())
}

pub fn validate_otp_code(code: &str) -> Result<(), ValidationError> {
    if !otp_code_pattern().is_match(code.trim()) {
        return Err(ValidationError::InvalidOtpCode(
            "must be 4 to 10 digits".to_string(),
        ));
    }
    Ok(())
}

/// Validate a payment amount in major currency units
pub fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() {
        return Err(ValidationError::InvalidAmount(
            "amount must be a finite number".to_string(),
        ));
    }

    if amount <= 0.0 {
        return Err(ValidationError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }

    if amount > MAX_PAYMENT_AMOUNT {
        return Err(ValidationError::InvalidAmount(format!(
            "amount exceeds maximum of {}",
            MAX_PAYMENT_AMOUNT
        )));
    }

    Ok(())
}

pub fn validate_fee(fee: f64) -> Result<(), ValidationError> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(ValidationError::InvalidAmount(
            "transaction fee cannot be negative".to_string(),
        ));
    }
    Ok(())
}
