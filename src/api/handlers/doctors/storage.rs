//! Database helpers for the doctor dashboard aggregates.
//!
//! All queries are scoped to the caller's active relations; a deactivated
//! relation drops the patient off the dashboard without touching history.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::{ActivityEntry, MetricsSummaryEntry, RosterPatient, TrendsResponse};

/// Roster of the doctor's active patients with per-patient aggregates.
/// Search and ordering happen in the handler.
pub(super) async fn load_roster(pool: &PgPool, doctor_id: Uuid) -> Result<Vec<RosterPatient>> {
    let query = r#"
        SELECT u.id, u.first_name, u.last_name, u.email,
               (SELECT COUNT(*)
                FROM sessions s
                JOIN patient_doctor r ON r.id = s.relation_id
                WHERE r.patient_id = u.id) AS session_count,
               to_char((SELECT MAX(s.time_created)
                        FROM sessions s
                        JOIN patient_doctor r ON r.id = s.relation_id
                        WHERE r.patient_id = u.id),
                       'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_session_at,
               to_char((SELECT MAX(f.time_created)
                        FROM patient_feedback f
                        WHERE f.patient_id = u.id),
                       'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_feedback_at,
               (SELECT m.avg_rom
                FROM metrics m
                JOIN sessions s ON s.id = m.session_id
                JOIN patient_doctor r ON r.id = s.relation_id
                WHERE r.patient_id = u.id
                ORDER BY m.time_created DESC
                LIMIT 1) AS last_avg_rom,
               (SELECT m.avg_velocity
                FROM metrics m
                JOIN sessions s ON s.id = m.session_id
                JOIN patient_doctor r ON r.id = s.relation_id
                WHERE r.patient_id = u.id
                ORDER BY m.time_created DESC
                LIMIT 1) AS last_avg_velocity
        FROM users u
        JOIN patient_doctor pd ON pd.patient_id = u.id
        WHERE pd.doctor_id = $1
          AND pd.active
          AND u.active
          AND NOT u.deleted
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(doctor_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load roster")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            RosterPatient {
                id: row.get::<Uuid, _>("id").to_string(),
                name: format!("{first} {last}").trim().to_string(),
                email: row.get("email"),
                session_count: row.get("session_count"),
                last_session_at: row.get("last_session_at"),
                last_feedback_at: row.get("last_feedback_at"),
                last_avg_rom: row.get("last_avg_rom"),
                last_avg_velocity: row.get("last_avg_velocity"),
            }
        })
        .collect())
}

/// Five most recent metric rows across the doctor's active patients.
pub(super) async fn metrics_summary(
    pool: &PgPool,
    doctor_id: Uuid,
) -> Result<Vec<MetricsSummaryEntry>> {
    let query = r#"
        SELECT u.id AS patient_id, u.first_name, u.last_name,
               m.joint, m.side, m.avg_rom, m.avg_velocity,
               to_char(m.time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS date,
               s.exercise_type
        FROM metrics m
        JOIN sessions s ON s.id = m.session_id
        JOIN patient_doctor pd ON pd.id = s.relation_id
        JOIN users u ON u.id = pd.patient_id
        WHERE pd.doctor_id = $1
          AND pd.active
        ORDER BY m.time_created DESC
        LIMIT 5
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(doctor_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load metrics summary")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            MetricsSummaryEntry {
                patient_id: row.get::<Uuid, _>("patient_id").to_string(),
                patient_name: format!("{first} {last}").trim().to_string(),
                joint: row.get("joint"),
                side: row.get("side"),
                avg_rom: row.get("avg_rom"),
                avg_velocity: row.get("avg_velocity"),
                date: row.get("date"),
                exercise_type: row.get("exercise_type"),
            }
        })
        .collect())
}

/// Feedback and session events from the last 7 days, newest first, capped
/// at five. The timestamp format sorts chronologically as text, so the
/// ORDER BY over the union is safe.
pub(super) async fn recent_activity(pool: &PgPool, doctor_id: Uuid) -> Result<Vec<ActivityEntry>> {
    let query = r#"
        SELECT 'feedback' AS kind, u.id AS patient_id, u.first_name, u.last_name,
               'Pain: ' || f.pain || '/10, Fatigue: ' || f.fatigue || '/10' AS label,
               to_char(f.time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS date,
               f.session_id::text AS session_id
        FROM patient_feedback f
        JOIN patient_doctor pd ON pd.patient_id = f.patient_id AND pd.active
        JOIN users u ON u.id = f.patient_id
        WHERE pd.doctor_id = $1
          AND f.time_created >= NOW() - INTERVAL '7 days'
        UNION ALL
        SELECT 'session' AS kind, u.id AS patient_id, u.first_name, u.last_name,
               'Exercise: ' || s.exercise_type AS label,
               to_char(s.time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS date,
               s.id::text AS session_id
        FROM sessions s
        JOIN patient_doctor pd ON pd.id = s.relation_id
        JOIN users u ON u.id = pd.patient_id
        WHERE pd.doctor_id = $1
          AND pd.active
          AND s.time_created >= NOW() - INTERVAL '7 days'
        ORDER BY date DESC
        LIMIT 5
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(doctor_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load recent activity")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            ActivityEntry {
                kind: row.get("kind"),
                patient_id: row.get::<Uuid, _>("patient_id").to_string(),
                patient_name: format!("{first} {last}").trim().to_string(),
                label: row.get("label"),
                date: row.get("date"),
                session_id: row.get("session_id"),
            }
        })
        .collect())
}

/// 30-day feedback averages over the doctor's active patients. Zero when
/// there is no feedback in the window.
pub(super) async fn trends(pool: &PgPool, doctor_id: Uuid) -> Result<TrendsResponse> {
    let query = r"
        SELECT COALESCE(ROUND(AVG(f.pain)::numeric, 2), 0)::float8 AS avg_pain,
               COALESCE(ROUND(AVG(f.fatigue)::numeric, 2), 0)::float8 AS avg_fatigue,
               COALESCE(ROUND(AVG(f.difficulty)::numeric, 2), 0)::float8 AS avg_difficulty
        FROM patient_feedback f
        JOIN patient_doctor pd ON pd.patient_id = f.patient_id AND pd.active
        WHERE pd.doctor_id = $1
          AND f.time_created >= NOW() - INTERVAL '30 days'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(doctor_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to load trends")?;

    Ok(TrendsResponse {
        avg_pain: row.get("avg_pain"),
        avg_fatigue: row.get("avg_fatigue"),
        avg_difficulty: row.get("avg_difficulty"),
    })
}
