//! Input validation for API requests.
//!
//! Each `validate_*` function returns `Err(message)` describing the first
//! problem with a single field. Handlers collect them per field with the
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::db::{Numeric, ProductCategory, UserRole};

lazy_static! {
    /// Letters, digits and @/./+/-/_
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();

    /// Deliberately loose: one @, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Largest amount a price column holds (10 digits, 2 after the point)
    static ref MAX_AMOUNT: Decimal = Decimal::from(100_000_000u64);
}

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_TEXT_LEN: usize = 255;
pub const MAX_PHONE_LEN: usize = 15;

const COMMON_PASSWORDS: [&str; 8] = [
    "password", "password1", "password123", "qwertyuiop",
    "iloveyou", "abcdefgh", "letmein1", "welcome1",
];

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username is too long (max {} characters)",
            MAX_USERNAME_LEN
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may contain only letters, digits and @/./+/-/_ characters".to_string(),
        );
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > MAX_EMAIL_LEN {
        return Err("Email is too long".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Enter a valid email address".to_string());
    }

    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("Password cannot be entirely numeric".to_string());
    }

    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err("Password is too common".to_string());
    }

    Ok(())
}

/// Validate a marketplace role (`farmer` or `buyer`)
pub fn validate_role(role: &str) -> Result<(), String> {
    if role.is_empty() {
        return Err("Role is required".to_string());
    }

    role.parse::<UserRole>()
        .map(|_| ())
        .map_err(|_| "Role must be one of: farmer, buyer".to_string())
}

/// Validate a required free-text field with a length cap
pub fn validate_text(value: &str, label: &str, max_len: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }

    if value.chars().count() > max_len {
        return Err(format!(
            "{} is too long (max {} characters)",
            label, max_len
        ));
    }

    Ok(())
}

/// Validate an optional free-text field; `None` is always accepted
pub fn validate_optional_text(
    value: &Option<String>,
    label: &str,
    max_len: usize,
) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max_len => Err(format!(
            "{} is too long (max {} characters)",
            label, max_len
        )),
        _ => Ok(()),
    }
}

/// Validate a phone number
pub fn validate_phone_number(phone: &str) -> Result<(), String> {
    validate_text(phone, "Phone number", MAX_PHONE_LEN)
}

/// Validate a product category (case-insensitive)
pub fn validate_category(category: &str) -> Result<(), String> {
    if category.is_empty() {
        return Err("Category is required".to_string());
    }

    if category.parse::<ProductCategory>().is_err() {
        return Err("Category must be one of: weight, number".to_string());
    }

    Ok(())
}

/// Validate a money-like amount (price, farm size): non-negative,
/// at most two decimal places, below 10^8
pub fn validate_amount(amount: &Numeric, label: &str) -> Result<(), String> {
    let value = amount.value();

    if value.is_sign_negative() && !value.is_zero() {
        return Err(format!("{} must not be negative", label));
    }

    if value.normalize().scale() > 2 {
        return Err(format!(
            "{} must have at most 2 decimal places",
            label
        ));
    }

    if value >= *MAX_AMOUNT {
        return Err(format!("{} is too large", label));
    }

    Ok(())
}

/// Validate a stock count
pub fn validate_stock(stock: i64) -> Result<(), String> {
    if stock < 0 {
        return Err("Stock must not be negative".to_string());
    }
    Ok(())
}

/// Store amounts with exactly two decimal places (`200` becomes `200.00`)
pub fn to_money(amount: Numeric) -> Numeric {
    let mut value = amount.value().normalize();
    value.rescale(2);
    Numeric::new(value)
}
