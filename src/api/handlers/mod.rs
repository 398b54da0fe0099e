//! API handlers and shared utilities.
//!
//! Each handler group keeps its request/response types in `types.rs` and its
//! database helpers in `storage.rs`, next to the handlers themselves.

pub mod auth;
pub mod doctors;
pub mod health;
pub mod movement;
pub mod patients;
pub mod sessions;

use regex::Regex;

/// Service banner for `GET /`.
pub async fn root() -> &'static str {
    "irhis backend"
}

/// Lightweight email sanity check used by auth handlers before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::valid_email;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }
}
