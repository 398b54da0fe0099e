//! Stateless bearer tokens.
//!
//! Tokens are HS256-signed JWTs carrying the user id and role. Verification
//! checks the signature and expiry; callers only ever see a uniform failure.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::principal::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a signed token for the given user.
pub fn issue(user_id: Uuid, role: Role, secret: &str, ttl_seconds: i64) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now,
        exp: now + ttl_seconds.max(1),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("failed to sign token")
}

/// Verify signature and expiry, returning the embedded claims.
pub fn verify(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .context("invalid token")?;
    Ok(data.claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issue_and_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue(user_id, Role::Doctor, SECRET, 60).unwrap();
        let claims = verify(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Doctor);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = issue(Uuid::new_v4(), Role::Patient, SECRET, 60).unwrap();
        assert!(verify(&token, "other-secret").is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(verify("not-a-token", SECRET).is_err());
        assert!(verify("", SECRET).is_err());
    }

    #[test]
    fn verify_rejects_expired() {
        // Expiry beyond the default 60s leeway
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: Role::Patient,
            iat: now - 600,
            exp: now - 300,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify(&token, SECRET).is_err());
    }
}
