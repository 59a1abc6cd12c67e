use validator::ValidateEmail;

pub const CHECKOUT_ID_MIN_LEN: usize = 20;
pub const CHECKOUT_ID_MAX_LEN: usize = 32;

/// Validates a gateway checkout identifier before it reaches any store or the gateway.
/// Rules:
/// - 20-32 characters
/// - ASCII letters and digits only (gateway ids are ULID-like)
pub fn is_valid_checkout_id(raw: &str) -> bool {
    (CHECKOUT_ID_MIN_LEN..=CHECKOUT_ID_MAX_LEN).contains(&raw.len())
        && raw.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validates that the input looks like a valid email address
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.len() <= 254 && email.validate_email()
}
