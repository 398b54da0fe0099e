//! Doctor dashboard endpoints, all scoped to the caller's active patients.

pub mod storage;
pub mod types;

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::error;

use self::types::{RosterPatient, RosterQuery, RosterResponse, RosterSort, TrendsResponse};
use super::auth::principal::{require_auth, Principal};
use crate::cli::globals::GlobalArgs;

async fn require_doctor_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    globals: &GlobalArgs,
) -> Result<Principal, StatusCode> {
    let principal = require_auth(headers, pool, globals).await?;
    principal.require_doctor()?;
    Ok(principal)
}

#[utoipa::path(
    get,
    path = "/v1/doctors/me/patients",
    params(RosterQuery),
    responses(
        (status = 200, description = "Active patients with aggregates", body = RosterResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "doctors"
)]
pub async fn list_my_patients(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    Query(query): Query<RosterQuery>,
) -> impl IntoResponse {
    let principal = match require_doctor_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let mut items = match storage::load_roster(&pool, principal.user_id).await {
        Ok(items) => items,
        Err(err) => {
            error!("Failed to load roster: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(search) = query.search.as_deref() {
        let needle = search.trim().to_lowercase();
        if !needle.is_empty() {
            items.retain(|patient| patient.name.to_lowercase().contains(&needle));
        }
    }
    sort_roster(&mut items, RosterSort::parse(query.sort.as_deref()));

    (StatusCode::OK, Json(RosterResponse { items })).into_response()
}

fn sort_roster(items: &mut [RosterPatient], sort: RosterSort) {
    match sort {
        RosterSort::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
        RosterSort::LastActivity => items.sort_by(|a, b| {
            b.last_activity()
                .unwrap_or("")
                .cmp(a.last_activity().unwrap_or(""))
        }),
        RosterSort::Progress => items.sort_by(|a, b| b.session_count.cmp(&a.session_count)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/doctors/me/metrics-summary",
    responses(
        (status = 200, description = "Five most recent metric rows", body = [types::MetricsSummaryEntry]),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "doctors"
)]
pub async fn metrics_summary(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    let principal = match require_doctor_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match storage::metrics_summary(&pool, principal.user_id).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => {
            error!("Failed to load metrics summary: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/doctors/me/recent-activity",
    responses(
        (status = 200, description = "Feedback and session events from the last 7 days", body = [types::ActivityEntry]),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "doctors"
)]
pub async fn recent_activity(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    let principal = match require_doctor_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match storage::recent_activity(&pool, principal.user_id).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => {
            error!("Failed to load recent activity: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/doctors/me/trends",
    responses(
        (status = 200, description = "30-day feedback averages", body = TrendsResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "doctors"
)]
pub async fn trends(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
) -> impl IntoResponse {
    let principal = match require_doctor_auth(&headers, &pool, &globals).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match storage::trends(&pool, principal.user_id).await {
        Ok(trends) => (StatusCode::OK, Json(trends)).into_response(),
        Err(err) => {
            error!("Failed to load trends: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(name: &str, sessions: i64, activity: Option<&str>) -> RosterPatient {
        RosterPatient {
            id: name.to_lowercase(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            session_count: sessions,
            last_session_at: activity.map(str::to_string),
            last_feedback_at: None,
            last_avg_rom: None,
            last_avg_velocity: None,
        }
    }

    #[test]
    fn sort_roster_by_name() {
        let mut items = vec![patient("Zoe", 1, None), patient("Ada", 2, None)];
        sort_roster(&mut items, RosterSort::Name);
        assert_eq!(items[0].name, "Ada");
    }

    #[test]
    fn sort_roster_by_last_activity_puts_recent_first() {
        let mut items = vec![
            patient("Ada", 1, Some("2024-01-01T00:00:00Z")),
            patient("Zoe", 1, Some("2024-02-01T00:00:00Z")),
            patient("Mia", 1, None),
        ];
        sort_roster(&mut items, RosterSort::LastActivity);
        assert_eq!(items[0].name, "Zoe");
        assert_eq!(items[2].name, "Mia");
    }

    #[test]
    fn sort_roster_by_progress_uses_session_count() {
        let mut items = vec![patient("Ada", 1, None), patient("Zoe", 5, None)];
        sort_roster(&mut items, RosterSort::Progress);
        assert_eq!(items[0].name, "Zoe");
    }
}
