//! Email normalization and password strength rules.

use regex::Regex;

pub const PASSWORD_MIN_LENGTH: usize = 12;
pub const PASSWORD_MAX_LENGTH: usize = 128;
/// Longest accepted email, in characters (RFC 5321 path limit).
pub const EMAIL_MAX_LENGTH: usize = 254;

// Compared lowercased; short entries are already caught by the length rule.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "qwerty", "letmein", "iloveyou", "admin", "welcome", "monkey", "dragon",
    "password123!", "password1234!", "p@ssword1234", "qwerty123456!", "welcome2024!",
    "welcome2025!", "iloveyou123!", "letmein12345!", "administrator1!",
];

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Check an already-normalized email; returns the first rule it breaks.
///
/// # Errors
/// Returns a user-facing message for an overlong or malformed address.
pub fn check_email(email_normalized: &str) -> Result<(), &'static str> {
    if email_normalized.chars().count() > EMAIL_MAX_LENGTH {
        return Err("Email must be at most 254 characters.");
    }
    if !valid_email(email_normalized) {
        return Err("Invalid email address.");
    }
    Ok(())
}

fn contains(pattern: &str, password: &str) -> bool {
    Regex::new(pattern).is_ok_and(|regex| regex.is_match(password))
}

/// Check a candidate password; returns the first rule it breaks.
///
/// # Errors
/// Returns a user-facing message naming the failed rule.
pub fn check_password(password: &str) -> Result<(), &'static str> {
    let length = password.chars().count();
    if length < PASSWORD_MIN_LENGTH {
        return Err("Password must be at least 12 characters.");
    }
    if length > PASSWORD_MAX_LENGTH {
        return Err("Password must be at most 128 characters.");
    }
    if !contains(r"[a-z]", password) {
        return Err("Password must include a lowercase letter.");
    }
    if !contains(r"[A-Z]", password) {
        return Err("Password must include an uppercase letter.");
    }
    if !contains(r"\d", password) {
        return Err("Password must include a digit.");
    }
    if !contains(r"[^\w\s]", password) {
        return Err("Password must include a symbol.");
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err("Password is too common.");
    }
    Ok(())
}
