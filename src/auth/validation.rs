//! Input Validation
//! Mission: Reject malformed emails, usernames and weak passwords before they
//! reach the store

use crate::auth::error::AuthError;
use regex::Regex;

pub const MAX_USERNAME_LEN: usize = 24;
pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static::lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern compiles");
}

/// Trimmed email if it looks like an address
pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if !EMAIL_PATTERN.is_match(email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email.to_string())
}

/// Trimmed username if non-empty and within the column limit
pub fn validate_username(username: &str) -> Result<String, AuthError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::EmptyUsername);
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AuthError::UsernameTooLong(MAX_USERNAME_LEN));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(AuthError::WeakPassword)
    }
}
