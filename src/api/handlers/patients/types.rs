//! Request/response types for patient endpoints.
//!
//! Ids and timestamps cross the API as strings; parsing to `Uuid` happens at
//! the handler boundary.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PatientSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PatientDetail {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub weight: Option<f64>,
    /// Stored in centimeters.
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub medical_history: Option<String>,
    pub time_after_symptoms: Option<String>,
    pub leg_dominance: Option<String>,
    pub physically_active: Option<bool>,
    pub affected_right_knee: Option<bool>,
    pub affected_left_knee: Option<bool>,
    pub affected_right_hip: Option<bool>,
    pub affected_left_hip: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ManualPatientRequest {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub weight: Option<f64>,
    /// Meters; converted to centimeters at rest.
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub medical_history: Option<String>,
    pub time_after_symptoms: Option<String>,
    pub leg_dominance: Option<String>,
    pub physically_active: Option<bool>,
    pub affected_right_knee: Option<bool>,
    pub affected_left_knee: Option<bool>,
    pub affected_right_hip: Option<bool>,
    pub affected_left_hip: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ManualPatientResponse {
    pub id: String,
    pub email: String,
    pub temporary_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct PatientDetailsUpdate {
    pub weight: Option<f64>,
    /// Meters; converted to centimeters at rest.
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub sex: Option<String>,
    pub medical_history: Option<String>,
}

impl PatientDetailsUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weight.is_none()
            && self.height.is_none()
            && self.bmi.is_none()
            && self.sex.is_none()
            && self.medical_history.is_none()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AssignResponse {
    pub relation_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FeedbackItem {
    pub session_id: Option<String>,
    pub pain: i32,
    pub fatigue: i32,
    pub difficulty: i32,
    pub comments: Option<String>,
}

/// The reference frontend submits either one entry or a batch.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum FeedbackPayload {
    One(FeedbackItem),
    Many(Vec<FeedbackItem>),
}

impl FeedbackPayload {
    #[must_use]
    pub fn into_items(self) -> Vec<FeedbackItem> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FeedbackSubmission {
    pub feedback: FeedbackPayload,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FeedbackEntry {
    pub id: String,
    pub session_id: Option<String>,
    pub pain: i32,
    pub fatigue: i32,
    pub difficulty: i32,
    pub comments: Option<String>,
    pub time_created: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FeedbackListResponse {
    pub items: Vec<FeedbackEntry>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FeedbackInsertResponse {
    pub inserted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_payload_accepts_single_object() {
        let json = r#"{"feedback":{"pain":3,"fatigue":4,"difficulty":5}}"#;
        let submission: FeedbackSubmission = serde_json::from_str(json).expect("decode");
        let items = submission.feedback.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].pain, 3);
        assert!(items[0].session_id.is_none());
    }

    #[test]
    fn feedback_payload_accepts_array() {
        let json = r#"{"feedback":[{"pain":1,"fatigue":1,"difficulty":1},
                                   {"pain":2,"fatigue":2,"difficulty":2,"comments":"ok"}]}"#;
        let submission: FeedbackSubmission = serde_json::from_str(json).expect("decode");
        let items = submission.feedback.into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].comments.as_deref(), Some("ok"));
    }

    #[test]
    fn details_update_is_empty_detects_noop() {
        assert!(PatientDetailsUpdate::default().is_empty());
        let update = PatientDetailsUpdate {
            weight: Some(80.0),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
