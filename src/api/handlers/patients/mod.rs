//! Patient management endpoints.
//!
//! Doctors manage the roster (unassigned list, manual creation, assignment,
//! clinical details); patients can read their own profile and submit
//! feedback. All routes resolve the bearer token first and enforce the
//! doctor/self access rules from the auth principal.

pub mod storage;
pub mod types;

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use self::{
    storage::AssignOutcome,
    types::{
        AssignResponse, FeedbackInsertResponse, FeedbackListResponse, ManualPatientRequest,
        ManualPatientResponse, PatientDetailsUpdate, PatientSummary,
    },
};
use super::auth::{password, principal::require_auth};
use crate::cli::globals::GlobalArgs;

/// Parse a path segment into a patient id, or reject with 400.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, StatusCode> {
    Uuid::parse_str(raw.trim()).map_err(|_| StatusCode::BAD_REQUEST)
}

#[utoipa::path(
    get,
    path = "/v1/patients/unassigned",
    responses(
        (status = 200, description = "Patients without an active doctor", body = [PatientSummary]),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "patients"
)]
pub async fn unassigned_patients(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_doctor() {
        return status.into_response();
    }

    match storage::list_unassigned(&pool).await {
        Ok(patients) => (StatusCode::OK, Json(patients)).into_response(),
        Err(err) => {
            error!("Failed to list unassigned patients: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/patients",
    request_body = ManualPatientRequest,
    responses(
        (status = 201, description = "Patient created and assigned", body = ManualPatientResponse),
        (status = 400, description = "Missing first name"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "patients"
)]
pub async fn create_manual_patient(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<ManualPatientRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_doctor() {
        return status.into_response();
    }

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if request.first_name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing first name").into_response();
    }

    // The doctor hands this password to the patient out of band.
    let temporary_password = password::generate_temp_password();
    let password_hash = match password::hash_password(&temporary_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash temporary password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match storage::create_manual_patient(&pool, principal.user_id, &request, &password_hash).await
    {
        Ok((patient_id, email)) => {
            let response = ManualPatientResponse {
                id: patient_id.to_string(),
                email,
                temporary_password,
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to create manual patient: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/patients/{id}",
    params(("id" = String, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Patient profile", body = types::PatientDetail),
        (status = 400, description = "Malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read themselves"),
        (status = 404, description = "No such patient"),
    ),
    tag = "patients"
)]
pub async fn get_patient(
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

    match storage::fetch_patient_detail(&pool, patient_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch patient: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/patients/{id}/details",
    params(("id" = String, Path, description = "Patient user id")),
    request_body = PatientDetailsUpdate,
    responses(
        (status = 200, description = "Updated patient profile", body = types::PatientDetail),
        (status = 400, description = "Malformed id or empty update"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No such patient"),
    ),
    tag = "patients"
)]
pub async fn update_details(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    payload: Option<Json<PatientDetailsUpdate>>,
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
    let Some(Json(update)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if update.is_empty() {
        return (StatusCode::BAD_REQUEST, "No fields to update").into_response();
    }

    match storage::patient_exists(&pool, patient_id).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to check patient: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if let Err(err) = storage::update_details(&pool, patient_id, &update).await {
        error!("Failed to update patient details: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match storage::fetch_patient_detail(&pool, patient_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch updated patient: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/patients/{id}/assign",
    params(("id" = String, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Patient assigned to the caller", body = AssignResponse),
        (status = 400, description = "Malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No such patient"),
    ),
    tag = "patients"
)]
pub async fn assign_doctor(
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
    let patient_id = match parse_id(&id) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    match storage::assign_patient(&pool, patient_id, principal.user_id).await {
        Ok(AssignOutcome::Assigned { relation_id }) => {
            let response = AssignResponse {
                relation_id: relation_id.to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(AssignOutcome::PatientNotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to assign patient: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/patients/{id}/feedback",
    params(("id" = String, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Feedback history, newest first", body = FeedbackListResponse),
        (status = 400, description = "Malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only read their own feedback"),
    ),
    tag = "patients"
)]
pub async fn list_feedback(
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

    match storage::list_feedback(&pool, patient_id).await {
        Ok(items) => (StatusCode::OK, Json(FeedbackListResponse { items })).into_response(),
        Err(err) => {
            error!("Failed to list feedback: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/patients/{id}/feedback",
    params(("id" = String, Path, description = "Patient user id")),
    request_body = types::FeedbackSubmission,
    responses(
        (status = 201, description = "Feedback stored", body = FeedbackInsertResponse),
        (status = 400, description = "Malformed id, empty batch or unknown session id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only submit their own feedback"),
        (status = 404, description = "No such patient"),
    ),
    tag = "patients"
)]
pub async fn submit_feedback(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<String>,
    payload: Option<Json<types::FeedbackSubmission>>,
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

    match storage::patient_exists(&pool, patient_id).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::NOT_FOUND, "Patient not found").into_response(),
        Err(err) => {
            error!("Failed to check patient: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let Some(Json(submission)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing feedback data").into_response();
    };
    let items = submission.feedback.into_items();
    if items.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing feedback data").into_response();
    }

    let mut resolved = Vec::with_capacity(items.len());
    for item in items {
        let session_id = match &item.session_id {
            Some(raw) => match Uuid::parse_str(raw.trim()) {
                Ok(id) => Some(id),
                Err(_) => {
                    return (StatusCode::BAD_REQUEST, "Malformed session id").into_response();
                }
            },
            None => None,
        };
        resolved.push((session_id, item));
    }

    let inserted = resolved.len();
    match storage::insert_feedback(&pool, patient_id, &resolved).await {
        Ok(storage::FeedbackOutcome::Inserted) => (
            StatusCode::CREATED,
            Json(FeedbackInsertResponse { inserted }),
        )
            .into_response(),
        Ok(storage::FeedbackOutcome::UnknownSession) => {
            (StatusCode::BAD_REQUEST, "Unknown session id").into_response()
        }
        Err(err) => {
            error!("Failed to store feedback: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_uuid_and_trims() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&format!(" {id} ")), Ok(id));
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert_eq!(parse_id("42"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_id(""), Err(StatusCode::BAD_REQUEST));
    }
}
