use utoipa::OpenApi;

use super::handlers::{auth, doctors, health, movement, patients, sessions};

/// OpenAPI document served at /api-docs/openapi.json and browsable at /docs.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::signup,
        auth::me,
        patients::create_manual_patient,
        patients::unassigned_patients,
        patients::get_patient,
        patients::update_details,
        patients::assign_doctor,
        patients::submit_feedback,
        patients::list_feedback,
        doctors::list_my_patients,
        doctors::metrics_summary,
        doctors::recent_activity,
        doctors::trends,
        sessions::create_session,
        sessions::list_patient_sessions,
        sessions::get_session,
        sessions::update_session,
        sessions::delete_session,
        sessions::submit_metrics,
        sessions::list_session_metrics,
        sessions::list_patient_metrics,
        movement::health,
        movement::analyze,
    ),
    tags(
        (name = "auth", description = "Login, signup and identity"),
        (name = "patients", description = "Patient records, assignment and feedback"),
        (name = "doctors", description = "Doctor dashboard aggregates"),
        (name = "sessions", description = "Exercise sessions and movement metrics"),
        (name = "movement", description = "External movement analysis proxy"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "sessions"));
        assert!(spec.paths.paths.contains_key("/v1/auth/login"));
        assert!(spec.paths.paths.contains_key("/v1/patients/{id}/assign"));
        assert!(spec.paths.paths.contains_key("/v1/movement/analyze"));
    }
}
