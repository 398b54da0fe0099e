//! Proxy to the external movement-analysis API.
//!
//! The analysis service is opaque: uploads are forwarded as-is and the
//! resulting JSON is returned untouched. Clients persist the aggregates they
//! care about through the session metrics endpoint.

use axum::{
    extract::{Extension, Multipart},
    http::HeaderMap,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use super::auth::principal::{require_auth, Principal, Role};
use super::patients;
use crate::api::APP_USER_AGENT;
use crate::cli::globals::GlobalArgs;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
// Analysis runs pose estimation on video, give it room.
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(60);

fn client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .build()
}

#[utoipa::path(
    get,
    path = "/v1/movement/health",
    responses(
        (status = 200, description = "External analysis API is healthy"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 503, description = "External analysis API unreachable or unhealthy"),
    ),
    tag = "movement"
)]
pub async fn health(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, &pool, &globals).await {
        return status.into_response();
    }

    let client = match client(HEALTH_TIMEOUT) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build HTTP client: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let url = format!("{}/health", globals.movement_api_url);
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            (
                StatusCode::OK,
                Json(json!({"status": "ok", "external_api": body})),
            )
                .into_response()
        }
        Ok(response) => {
            warn!("Movement API health returned {}", response.status());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "error", "message": "External API not responding"})),
            )
                .into_response()
        }
        Err(err) => {
            warn!("Movement API unreachable: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "error", "message": "External API unreachable"})),
            )
                .into_response()
        }
    }
}

struct Upload {
    data: Vec<u8>,
    file_name: String,
    content_type: Option<String>,
}

struct AnalyzeForm {
    upload: Option<Upload>,
    patient_id: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<AnalyzeForm, StatusCode> {
    let mut form = AnalyzeForm {
        upload: None,
        patient_id: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .to_vec();
                form.upload = Some(Upload {
                    data,
                    file_name,
                    content_type,
                });
            }
            Some("patient_id") => {
                let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    form.patient_id = Some(value);
                }
            }
            // exercise_type and other fields are client-side concerns here
            _ => {}
        }
    }
    Ok(form)
}

/// Enforce who may analyze whose data. Returns the patient id to act on, if
/// any was named.
async fn authorize_analysis(
    principal: &Principal,
    pool: &PgPool,
    patient_id: Option<&str>,
) -> Result<Option<Uuid>, StatusCode> {
    let Some(raw) = patient_id else {
        return Ok(None);
    };
    let patient_id = Uuid::parse_str(raw.trim()).map_err(|_| StatusCode::BAD_REQUEST)?;

    match principal.role {
        Role::Patient => {
            if principal.user_id != patient_id {
                return Err(StatusCode::FORBIDDEN);
            }
        }
        Role::Doctor => {
            let exists = patients::storage::patient_exists(pool, patient_id)
                .await
                .map_err(|err| {
                    error!("Failed to check patient: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;
            if !exists {
                return Err(StatusCode::NOT_FOUND);
            }
        }
    }
    Ok(Some(patient_id))
}

#[utoipa::path(
    post,
    path = "/v1/movement/analyze",
    request_body(content = Vec<u8>, content_type = "multipart/form-data",
        description = "file upload plus optional patient_id form field"),
    responses(
        (status = 200, description = "Analysis result from the external API"),
        (status = 400, description = "No file provided or malformed patient id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Patients may only analyze their own data"),
        (status = 404, description = "Named patient does not exist"),
        (status = 502, description = "External API rejected the upload"),
        (status = 503, description = "External API unreachable"),
    ),
    tag = "movement"
)]
pub async fn analyze(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let form = match read_form(&mut multipart).await {
        Ok(form) => form,
        Err(status) => return (status, "Malformed multipart payload").into_response(),
    };
    let Some(upload) = form.upload else {
        return (StatusCode::BAD_REQUEST, "No file provided").into_response();
    };
    if upload.data.is_empty() {
        return (StatusCode::BAD_REQUEST, "No file provided").into_response();
    }

    if let Err(status) = authorize_analysis(&principal, &pool, form.patient_id.as_deref()).await {
        return status.into_response();
    }

    let client = match client(ANALYZE_TIMEOUT) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build HTTP client: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut part = reqwest::multipart::Part::bytes(upload.data).file_name(upload.file_name);
    if let Some(content_type) = upload.content_type {
        part = match part.mime_str(&content_type) {
            Ok(part) => part,
            Err(_) => return (StatusCode::BAD_REQUEST, "Invalid content type").into_response(),
        };
    }
    let body = reqwest::multipart::Form::new().part("file", part);

    let url = format!("{}/analyze", globals.movement_api_url);
    match client.post(&url).multipart(body).send().await {
        Ok(response) if response.status().is_success() => {
            let result: Value = response.json().await.unwrap_or(Value::Null);
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Analysis completed successfully",
                    "result": result,
                })),
            )
                .into_response()
        }
        Ok(response) => {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!("Movement API rejected analysis: {status} {detail}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "success": false,
                    "message": "External API analysis failed",
                    "error": detail,
                })),
            )
                .into_response()
        }
        Err(err) => {
            warn!("Movement API unreachable: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "message": "External API unreachable",
                })),
            )
                .into_response()
        }
    }
}
