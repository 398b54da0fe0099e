//! Session and movement-metric endpoints.
//!
//! Sessions hang off the active doctor-patient relation; metric rows hang off
//! sessions. Doctors manage sessions, patients read their own and push the
//! per-repetition metrics produced by the movement analysis.

pub mod storage;
pub mod types;

use axum::{
    extract::{Extension, Path, Query},
    http::HeaderMap,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use self::types::{
    MetricsInsertResponse, MetricsQuery, MetricsSubmission, SessionCreateRequest, SessionDetail,
    SessionUpdateRequest,
};
use super::auth::principal::require_auth;
use super::patients::parse_id;
use crate::cli::globals::GlobalArgs;

const DEFAULT_METRICS_LIMIT: i64 = 10;

#[utoipa::path(
    get,
    path = "/v1/patients/{id}/sessions",
    params(("id" = String, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Sessions for the patient, newest first", body = [SessionDetail]),
        (status = 400, description = "Malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read their own sessions"),
    ),
    tag = "sessions"
)]
pub async fn list_patient_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let patient_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_self_or_doctor(patient_id) {
        return status.into_response();
    }

    match storage::list_sessions_for_patient(&pool, patient_id).await {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(err) => {
            error!("Failed to list sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/patients/{id}/sessions",
    params(("id" = String, Path, description = "Patient user id")),
    request_body = SessionCreateRequest,
    responses(
        (status = 201, description = "Session created", body = SessionDetail),
        (status = 400, description = "Malformed id or missing exercise type"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No active relation with this patient"),
    ),
    tag = "sessions"
)]
pub async fn create_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    payload: Option<Json<SessionCreateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_doctor() {
        return status.into_response();
    }
    let patient_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if request.exercise_type.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing exercise type").into_response();
    }

    // Sessions are always created under the caller's own relation.
    let relation_id = match storage::active_relation_id(&pool, patient_id, principal.user_id).await
    {
        Ok(Some(relation_id)) => relation_id,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to resolve relation: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let session_id = match storage::insert_session(&pool, relation_id, &request).await {
        Ok(session_id) => session_id,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match storage::fetch_session(&pool, session_id).await {
        Ok(Some(session)) => (StatusCode::CREATED, Json(session)).into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            error!("Failed to fetch created session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session detail", body = SessionDetail),
        (status = 400, description = "Malformed session id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read their own sessions"),
        (status = 404, description = "No such session"),
    ),
    tag = "sessions"
)]
pub async fn get_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let session_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    let session = match storage::fetch_session(&pool, session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match owning_patient(&session) {
        Ok(patient_id) => {
            if let Err(status) = principal.require_self_or_doctor(patient_id) {
                return status.into_response();
            }
        }
        Err(status) => return status.into_response(),
    }

    (StatusCode::OK, Json(session)).into_response()
}

#[utoipa::path(
    put,
    path = "/v1/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    request_body = SessionUpdateRequest,
    responses(
        (status = 200, description = "Updated session", body = SessionDetail),
        (status = 400, description = "Malformed id or empty update"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No such session"),
    ),
    tag = "sessions"
)]
pub async fn update_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    payload: Option<Json<SessionUpdateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_doctor() {
        return status.into_response();
    }
    let session_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    let Some(Json(update)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if update.is_empty() {
        return (StatusCode::BAD_REQUEST, "No fields to update").into_response();
    }

    match storage::update_session(&pool, session_id, &update).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match storage::fetch_session(&pool, session_id).await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch updated session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session, metrics and feedback removed"),
        (status = 400, description = "Malformed session id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No such session"),
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_doctor() {
        return status.into_response();
    }
    let session_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    match storage::fetch_session(&pool, session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match storage::delete_session_cascade(&pool, session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to delete session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}/metrics",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Metric rows ordered by repetition", body = [types::MetricEntry]),
        (status = 400, description = "Malformed session id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read their own metrics"),
        (status = 404, description = "No such session"),
    ),
    tag = "sessions"
)]
pub async fn list_session_metrics(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let session_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    let session = match storage::fetch_session(&pool, session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match owning_patient(&session) {
        Ok(patient_id) => {
            if let Err(status) = principal.require_self_or_doctor(patient_id) {
                return status.into_response();
            }
        }
        Err(status) => return status.into_response(),
    }

    match storage::list_metrics_by_session(&pool, session_id).await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(err) => {
            error!("Failed to list session metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/metrics",
    params(("id" = String, Path, description = "Session id")),
    request_body = MetricsSubmission,
    responses(
        (status = 201, description = "Metric rows stored", body = MetricsInsertResponse),
        (status = 400, description = "Malformed id or empty batch"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only submit their own metrics"),
        (status = 404, description = "No such session"),
    ),
    tag = "sessions"
)]
pub async fn submit_metrics(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    payload: Option<Json<MetricsSubmission>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let session_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    let session = match storage::fetch_session(&pool, session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match owning_patient(&session) {
        Ok(patient_id) => {
            if let Err(status) = principal.require_self_or_doctor(patient_id) {
                return status.into_response();
            }
        }
        Err(status) => return status.into_response(),
    }

    let Some(Json(submission)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing metrics data").into_response();
    };
    if submission.metrics.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing metrics data").into_response();
    }

    match storage::insert_metrics(&pool, session_id, &submission.metrics).await {
        Ok((inserted, skipped)) => (
            StatusCode::CREATED,
            Json(MetricsInsertResponse { inserted, skipped }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to store metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/patients/{id}/metrics",
    params(
        ("id" = String, Path, description = "Patient user id"),
        MetricsQuery,
    ),
    responses(
        (status = 200, description = "Recent metric rows with exercise type", body = [types::PatientMetricEntry]),
        (status = 400, description = "Malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read their own metrics"),
    ),
    tag = "sessions"
)]
pub async fn list_patient_metrics(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let patient_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_self_or_doctor(patient_id) {
        return status.into_response();
    }

    let limit = query
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_METRICS_LIMIT);

    match storage::list_metrics_by_patient(&pool, patient_id, limit).await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(err) => {
            error!("Failed to list patient metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn owning_patient(session: &SessionDetail) -> Result<Uuid, StatusCode> {
    Uuid::parse_str(&session.patient_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(patient_id: &str) -> SessionDetail {
        SessionDetail {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            exercise_type: "squat".to_string(),
            exercise_description: None,
            repetitions: Some(10),
            duration: None,
            time_created: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn owning_patient_parses_stored_id() {
        let id = Uuid::new_v4();
        assert_eq!(owning_patient(&session(&id.to_string())), Ok(id));
    }

    #[test]
    fn owning_patient_rejects_corrupt_id() {
        assert_eq!(
            owning_patient(&session("not-a-uuid")),
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }
}
