//! Request/response types for session and metrics endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionCreateRequest {
    pub exercise_type: String,
    pub exercise_description: Option<String>,
    pub repetitions: Option<i32>,
    /// Free-form duration, e.g. "00:15:00".
    pub duration: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SessionUpdateRequest {
    pub exercise_type: Option<String>,
    pub exercise_description: Option<String>,
    pub repetitions: Option<i32>,
    pub duration: Option<String>,
}

impl SessionUpdateRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exercise_type.is_none()
            && self.exercise_description.is_none()
            && self.repetitions.is_none()
            && self.duration.is_none()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionDetail {
    pub id: String,
    pub patient_id: String,
    pub exercise_type: String,
    pub exercise_description: Option<String>,
    pub repetitions: Option<i32>,
    pub duration: Option<String>,
    pub time_created: String,
}

/// One per-repetition measurement from the movement analysis. Unset numeric
/// fields default to zero on insert.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct MetricItem {
    pub joint: Option<String>,
    pub side: Option<String>,
    pub repetition: Option<i32>,
    pub min_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub avg_velocity: Option<f64>,
    pub p95_velocity: Option<f64>,
    pub min_rom: Option<f64>,
    pub max_rom: Option<f64>,
    pub avg_rom: Option<f64>,
    pub center_mass_displacement: Option<f64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MetricsSubmission {
    pub metrics: Vec<MetricItem>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MetricsInsertResponse {
    pub inserted: usize,
    /// Items dropped because the joint is neither knee nor hip.
    pub skipped: usize,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MetricEntry {
    pub id: String,
    pub session_id: String,
    pub joint: String,
    pub side: String,
    pub repetition: i32,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub avg_velocity: f64,
    pub p95_velocity: f64,
    pub min_rom: f64,
    pub max_rom: f64,
    pub avg_rom: f64,
    pub center_mass_displacement: f64,
    pub time_created: String,
}

/// Metric row joined with its session's exercise type, for patient history.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PatientMetricEntry {
    #[serde(flatten)]
    pub metric: MetricEntry,
    pub exercise_type: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct MetricsQuery {
    /// Maximum number of rows to return, defaults to 10.
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_is_empty_detects_noop() {
        assert!(SessionUpdateRequest::default().is_empty());
        let update = SessionUpdateRequest {
            repetitions: Some(12),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn metric_item_tolerates_sparse_payloads() {
        let json = r#"{"joint":"knee","avg_rom":42.5}"#;
        let item: MetricItem = serde_json::from_str(json).expect("decode");
        assert_eq!(item.joint.as_deref(), Some("knee"));
        assert_eq!(item.avg_rom, Some(42.5));
        assert!(item.side.is_none());
    }

    #[test]
    fn patient_metric_entry_flattens_metric_fields() {
        let entry = PatientMetricEntry {
            metric: MetricEntry {
                id: "m1".to_string(),
                session_id: "s1".to_string(),
                joint: "hip".to_string(),
                side: "right".to_string(),
                repetition: 2,
                min_velocity: 0.0,
                max_velocity: 1.0,
                avg_velocity: 0.5,
                p95_velocity: 0.9,
                min_rom: 10.0,
                max_rom: 90.0,
                avg_rom: 45.0,
                center_mass_displacement: 0.1,
                time_created: "2024-01-01T00:00:00Z".to_string(),
            },
            exercise_type: "squat".to_string(),
        };
        let value = serde_json::to_value(&entry).expect("encode");
        assert_eq!(value["joint"], "hip");
        assert_eq!(value["exercise_type"], "squat");
    }
}
