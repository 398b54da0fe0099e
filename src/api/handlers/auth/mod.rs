//! Login, signup and identity endpoints.
//!
//! Flow Overview:
//! 1) Validate the payload.
//! 2) Check credentials against the users table (login) or create the account
//!    (signup, with the patients row in the same transaction).
//! 3) Issue a signed bearer token carrying user id and role.

pub mod password;
pub mod principal;
pub mod storage;
pub mod token;
pub mod types;

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::error;

use self::{
    principal::{require_auth, Principal},
    storage::SignupOutcome,
    types::{AuthResponse, LoginRequest, SignupRequest, UserSummary},
};
use super::valid_email;
use crate::cli::globals::GlobalArgs;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing email, password, or role"),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing email, password, or role").into_response();
    }

    let record = match storage::lookup_login_record(&pool, &email, request.role).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to lookup login record: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Unknown email, wrong role and disabled accounts all collapse into 401.
    let Some(record) = record else {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    };

    match password::verify_password(&request.password, &record.password_hash) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
        Err(err) => {
            error!("Failed to verify password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let token = match token::issue(
        record.user_id,
        request.role,
        globals.token_secret.expose_secret(),
        globals.token_ttl_seconds,
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = AuthResponse {
        token,
        user: UserSummary {
            id: record.user_id.to_string(),
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            role: request.role,
        },
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid or missing fields"),
        (status = 409, description = "Email already registered"),
    ),
    tag = "auth"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let email = request.email.trim().to_lowercase();
    let first_name = request.first_name.trim().to_string();
    let last_name = request.last_name.trim().to_string();

    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email").into_response();
    }
    if request.password.is_empty() || first_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing required fields").into_response();
    }

    let password_hash = match password::hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let outcome = storage::insert_user(
        &pool,
        &email,
        &password_hash,
        request.role,
        &first_name,
        &last_name,
    )
    .await;

    let user_id = match outcome {
        Ok(SignupOutcome::Created(user_id)) => user_id,
        Ok(SignupOutcome::Conflict) => {
            return (StatusCode::CONFLICT, "Email already registered").into_response();
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let token = match token::issue(
        user_id,
        request.role,
        globals.token_secret.expose_secret(),
        globals.token_ttl_seconds,
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = AuthResponse {
        token,
        user: UserSummary {
            id: user_id.to_string(),
            email,
            first_name,
            last_name,
            role: request.role,
        },
    };
    (StatusCode::CREATED, Json(response)).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserSummary),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => (StatusCode::OK, Json(user_summary(&principal))).into_response(),
        Err(status) => status.into_response(),
    }
}

fn user_summary(principal: &Principal) -> UserSummary {
    UserSummary {
        id: principal.user_id.to_string(),
        email: principal.email.clone(),
        first_name: principal.first_name.clone(),
        last_name: principal.last_name.clone(),
        role: principal.role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::principal::Role;
    use uuid::Uuid;

    #[test]
    fn user_summary_mirrors_principal() {
        let principal = Principal {
            user_id: Uuid::new_v4(),
            email: "doc@example.com".to_string(),
            role: Role::Doctor,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
        };
        let summary = user_summary(&principal);
        assert_eq!(summary.id, principal.user_id.to_string());
        assert_eq!(summary.email, "doc@example.com");
        assert_eq!(summary.role, Role::Doctor);
    }
}
