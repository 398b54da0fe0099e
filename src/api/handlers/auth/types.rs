//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::principal::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_round_trips() {
        let json = r#"{"email":"a@b.co","password":"pw","role":"doctor"}"#;
        let request: LoginRequest = serde_json::from_str(json).expect("decode");
        assert_eq!(request.role, Role::Doctor);
        assert_eq!(request.email, "a@b.co");
    }

    #[test]
    fn signup_request_defaults_last_name() {
        let json = r#"{"email":"a@b.co","password":"pw","role":"patient","first_name":"Ada"}"#;
        let request: SignupRequest = serde_json::from_str(json).expect("decode");
        assert!(request.last_name.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        let value = serde_json::to_value(Role::Patient).expect("encode");
        assert_eq!(value, serde_json::json!("patient"));
    }
}
