//! Authenticated principal extraction and authorization helpers.
//!
//! Handlers call `require_auth` to turn the bearer token into a `Principal`
//! backed by a live user row, then use the role helpers to enforce each
//! endpoint's access rule.

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{storage, token};
use crate::cli::globals::GlobalArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }

    /// Parse the role column, tolerating legacy capitalized values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "doctor" => Some(Self::Doctor),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated user context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
}

impl Principal {
    /// Reject with 403 unless the caller is a doctor.
    pub fn require_doctor(&self) -> Result<(), StatusCode> {
        if self.role == Role::Doctor {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    }

    /// Doctors may act on any patient; patients only on themselves.
    pub fn require_self_or_doctor(&self, patient_id: Uuid) -> Result<(), StatusCode> {
        if self.role == Role::Doctor || self.user_id == patient_id {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Resolve the bearer token into a principal, or return 401.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    globals: &GlobalArgs,
) -> Result<Principal, StatusCode> {
    let Some(raw) = extract_bearer_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = token::verify(&raw, globals.token_secret.expose_secret())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;

    match storage::fetch_active_user(pool, user_id).await {
        Ok(Some(record)) => {
            // A token that no longer maps to an active account is dead.
            let Some(role) = Role::parse(&record.role) else {
                return Err(StatusCode::UNAUTHORIZED);
            };
            Ok(Principal {
                user_id: record.user_id,
                email: record.email,
                role,
                first_name: record.first_name,
                last_name: record.last_name,
            })
        }
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to load user for token: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn principal(role: Role, user_id: Uuid) -> Principal {
        Principal {
            user_id,
            email: "user@example.com".to_string(),
            role,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[test]
    fn role_parse_tolerates_capitalization() {
        assert_eq!(Role::parse("Doctor"), Some(Role::Doctor));
        assert_eq!(Role::parse(" patient "), Some(Role::Patient));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn require_doctor_rejects_patients() {
        let id = Uuid::new_v4();
        assert!(principal(Role::Doctor, id).require_doctor().is_ok());
        assert_eq!(
            principal(Role::Patient, id).require_doctor(),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn self_or_doctor_scopes_patients_to_themselves() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let patient = principal(Role::Patient, own);
        assert!(patient.require_self_or_doctor(own).is_ok());
        assert_eq!(
            patient.require_self_or_doctor(other),
            Err(StatusCode::FORBIDDEN)
        );
        assert!(principal(Role::Doctor, own)
            .require_self_or_doctor(other)
            .is_ok());
    }

    #[test]
    fn extract_bearer_token_parses_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_bearer_token_rejects_empty_or_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn display_name_trims_missing_parts() {
        let mut p = principal(Role::Patient, Uuid::new_v4());
        p.last_name = String::new();
        assert_eq!(p.display_name(), "Ada");
    }
}
