//! Password hashing and verification.
//!
//! Passwords are Argon2id-hashed and stored as PHC strings. Temporary
//! passwords for manually created patients come from a restricted alphabet so
//! doctors can read them over the phone.

use anyhow::Result;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{rngs::OsRng, RngCore};

const TEMP_PASSWORD_LEN: usize = 12;
const TEMP_PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Hash a password using Argon2id with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored PHC hash string.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow::anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate a temporary password for manually created patient accounts.
pub fn generate_temp_password() -> String {
    let mut raw = [0u8; TEMP_PASSWORD_LEN];
    OsRng.fill_bytes(&mut raw);
    let mut out = String::with_capacity(TEMP_PASSWORD_LEN);
    for byte in raw {
        let idx = usize::from(byte) % TEMP_PASSWORD_ALPHABET.len();
        if let Some(&char_byte) = TEMP_PASSWORD_ALPHABET.get(idx) {
            out.push(char_byte as char);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same input").unwrap();
        let second = hash_password("same input").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn temp_password_uses_alphabet() {
        let password = generate_temp_password();
        assert_eq!(password.len(), TEMP_PASSWORD_LEN);
        assert!(password
            .bytes()
            .all(|ch| TEMP_PASSWORD_ALPHABET.contains(&ch)));
    }
}
