//! Request/response types for the doctor dashboard.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(IntoParams, Deserialize, Debug)]
pub struct RosterQuery {
    /// Case-insensitive substring match on the patient name.
    pub search: Option<String>,
    /// One of `name`, `last_activity`, `progress`. Defaults to `name`.
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSort {
    Name,
    LastActivity,
    Progress,
}

impl RosterSort {
    /// Unknown values fall back to name ordering.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("last_activity") => Self::LastActivity,
            Some("progress") => Self::Progress,
            _ => Self::Name,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RosterPatient {
    pub id: String,
    pub name: String,
    pub email: String,
    pub session_count: i64,
    pub last_session_at: Option<String>,
    pub last_feedback_at: Option<String>,
    pub last_avg_rom: Option<f64>,
    pub last_avg_velocity: Option<f64>,
}

impl RosterPatient {
    /// Most recent of feedback and session timestamps; ISO strings compare
    /// chronologically.
    #[must_use]
    pub fn last_activity(&self) -> Option<&str> {
        match (self.last_feedback_at.as_deref(), self.last_session_at.as_deref()) {
            (Some(feedback), Some(session)) => Some(feedback.max(session)),
            (Some(feedback), None) => Some(feedback),
            (None, Some(session)) => Some(session),
            (None, None) => None,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RosterResponse {
    pub items: Vec<RosterPatient>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MetricsSummaryEntry {
    pub patient_id: String,
    pub patient_name: String,
    pub joint: String,
    pub side: String,
    pub avg_rom: f64,
    pub avg_velocity: f64,
    pub date: String,
    pub exercise_type: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivityEntry {
    /// Either `feedback` or `session`.
    #[serde(rename = "type")]
    pub kind: String,
    pub patient_id: String,
    pub patient_name: String,
    pub label: String,
    pub date: String,
    pub session_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TrendsResponse {
    pub avg_pain: f64,
    pub avg_fatigue: f64,
    pub avg_difficulty: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_sort_parse_falls_back_to_name() {
        assert_eq!(RosterSort::parse(None), RosterSort::Name);
        assert_eq!(RosterSort::parse(Some("progress")), RosterSort::Progress);
        assert_eq!(
            RosterSort::parse(Some("last_activity")),
            RosterSort::LastActivity
        );
        assert_eq!(RosterSort::parse(Some("bogus")), RosterSort::Name);
    }

    #[test]
    fn last_activity_picks_most_recent() {
        let mut patient = RosterPatient {
            id: "p".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            session_count: 3,
            last_session_at: Some("2024-02-01T10:00:00Z".to_string()),
            last_feedback_at: Some("2024-02-02T10:00:00Z".to_string()),
            last_avg_rom: None,
            last_avg_velocity: None,
        };
        assert_eq!(patient.last_activity(), Some("2024-02-02T10:00:00Z"));
        patient.last_feedback_at = None;
        assert_eq!(patient.last_activity(), Some("2024-02-01T10:00:00Z"));
        patient.last_session_at = None;
        assert_eq!(patient.last_activity(), None);
    }

    #[test]
    fn activity_entry_serializes_kind_as_type() {
        let entry = ActivityEntry {
            kind: "feedback".to_string(),
            patient_id: "p".to_string(),
            patient_name: "Ada".to_string(),
            label: "Pain: 3/10, Fatigue: 4/10".to_string(),
            date: "2024-02-01T10:00:00Z".to_string(),
            session_id: None,
        };
        let value = serde_json::to_value(&entry).expect("encode");
        assert_eq!(value["type"], "feedback");
    }
}
