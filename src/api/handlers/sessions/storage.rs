//! Database helpers for sessions and movement metrics.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::{
    MetricEntry, MetricItem, PatientMetricEntry, SessionCreateRequest, SessionDetail,
    SessionUpdateRequest,
};

const SESSION_COLUMNS: &str = r#"
    s.id, pd.patient_id, s.exercise_type, s.exercise_description,
    s.repetitions, s.duration,
    to_char(s.time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS time_created
"#;

/// The caller's active relation with the patient, if any.
pub(super) async fn active_relation_id(
    pool: &PgPool,
    patient_id: Uuid,
    doctor_id: Uuid,
) -> Result<Option<Uuid>> {
    let query = r"
        SELECT id
        FROM patient_doctor
        WHERE patient_id = $1
          AND doctor_id = $2
          AND active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up active relation")?;
    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn insert_session(
    pool: &PgPool,
    relation_id: Uuid,
    request: &SessionCreateRequest,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO sessions
            (id, relation_id, exercise_type, exercise_description, repetitions, duration)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let session_id = Uuid::new_v4();
    sqlx::query(query)
        .bind(session_id)
        .bind(relation_id)
        .bind(request.exercise_type.trim())
        .bind(&request.exercise_description)
        .bind(request.repetitions)
        .bind(&request.duration)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(session_id)
}

/// Session joined with its owning patient. `None` for unknown ids.
pub(super) async fn fetch_session(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Option<SessionDetail>> {
    let query = format!(
        r"
        SELECT {SESSION_COLUMNS}
        FROM sessions s
        JOIN patient_doctor pd ON pd.id = s.relation_id
        WHERE s.id = $1
        LIMIT 1
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(session_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch session")?;
    Ok(row.map(|row| session_detail(&row)))
}

/// All sessions for a patient across relations, newest first.
pub(super) async fn list_sessions_for_patient(
    pool: &PgPool,
    patient_id: Uuid,
) -> Result<Vec<SessionDetail>> {
    let query = format!(
        r"
        SELECT {SESSION_COLUMNS}
        FROM sessions s
        JOIN patient_doctor pd ON pd.id = s.relation_id
        WHERE pd.patient_id = $1
        ORDER BY s.time_created DESC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(patient_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list sessions")?;
    Ok(rows.iter().map(session_detail).collect())
}

/// Partial update of the exercise fields. Returns false for unknown ids.
pub(super) async fn update_session(
    pool: &PgPool,
    session_id: Uuid,
    update: &SessionUpdateRequest,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET exercise_type = COALESCE($2, exercise_type),
            exercise_description = COALESCE($3, exercise_description),
            repetitions = COALESCE($4, repetitions),
            duration = COALESCE($5, duration)
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(session_id)
        .bind(&update.exercise_type)
        .bind(&update.exercise_description)
        .bind(update.repetitions)
        .bind(&update.duration)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session")?;
    Ok(result.rows_affected() > 0)
}

/// Remove a session with its metrics and feedback in one transaction.
pub(super) async fn delete_session_cascade(pool: &PgPool, session_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin delete transaction")?;

    for query in [
        "DELETE FROM metrics WHERE session_id = $1",
        "DELETE FROM patient_feedback WHERE session_id = $1",
        "DELETE FROM sessions WHERE id = $1",
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete session data")?;
    }

    tx.commit().await.context("commit delete transaction")?;

    Ok(())
}

/// Joint/side values a metric row may carry.
fn normalize_joint(raw: Option<&str>) -> Option<&'static str> {
    match raw.unwrap_or("knee").trim().to_lowercase().as_str() {
        "knee" => Some("knee"),
        "hip" => Some("hip"),
        _ => None,
    }
}

fn normalize_side(raw: Option<&str>) -> &'static str {
    match raw.unwrap_or("").trim().to_lowercase().as_str() {
        "right" => "right",
        _ => "left",
    }
}

/// Store metric rows for a session. Items with a joint other than knee or
/// hip (e.g. center-of-mass pseudo joints) are skipped, not rejected.
/// Returns (inserted, skipped).
pub(super) async fn insert_metrics(
    pool: &PgPool,
    session_id: Uuid,
    items: &[MetricItem],
) -> Result<(usize, usize)> {
    let mut tx = pool.begin().await.context("begin metrics transaction")?;

    let query = r"
        INSERT INTO metrics
            (id, session_id, joint, side, repetition,
             min_velocity, max_velocity, avg_velocity, p95_velocity,
             min_rom, max_rom, avg_rom, center_mass_displacement)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ";
    let mut inserted = 0;
    let mut skipped = 0;
    for item in items {
        let Some(joint) = normalize_joint(item.joint.as_deref()) else {
            skipped += 1;
            continue;
        };
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(joint)
            .bind(normalize_side(item.side.as_deref()))
            .bind(item.repetition.unwrap_or(0))
            .bind(item.min_velocity.unwrap_or(0.0))
            .bind(item.max_velocity.unwrap_or(0.0))
            .bind(item.avg_velocity.unwrap_or(0.0))
            .bind(item.p95_velocity.unwrap_or(0.0))
            .bind(item.min_rom.unwrap_or(0.0))
            .bind(item.max_rom.unwrap_or(0.0))
            .bind(item.avg_rom.unwrap_or(0.0))
            .bind(item.center_mass_displacement.unwrap_or(0.0))
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert metric row")?;
        inserted += 1;
    }

    tx.commit().await.context("commit metrics transaction")?;

    Ok((inserted, skipped))
}

const METRIC_COLUMNS: &str = r#"
    m.id, m.session_id, m.joint, m.side, m.repetition,
    m.min_velocity, m.max_velocity, m.avg_velocity, m.p95_velocity,
    m.min_rom, m.max_rom, m.avg_rom, m.center_mass_displacement,
    to_char(m.time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS time_created
"#;

pub(super) async fn list_metrics_by_session(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Vec<MetricEntry>> {
    let query = format!(
        r"
        SELECT {METRIC_COLUMNS}
        FROM metrics m
        WHERE m.session_id = $1
        ORDER BY m.repetition ASC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(session_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list session metrics")?;
    Ok(rows.iter().map(metric_entry).collect())
}

/// Recent metric rows across all of a patient's sessions, joined with the
/// exercise type.
pub(super) async fn list_metrics_by_patient(
    pool: &PgPool,
    patient_id: Uuid,
    limit: i64,
) -> Result<Vec<PatientMetricEntry>> {
    let query = format!(
        r"
        SELECT {METRIC_COLUMNS}, s.exercise_type
        FROM metrics m
        JOIN sessions s ON s.id = m.session_id
        JOIN patient_doctor pd ON pd.id = s.relation_id
        WHERE pd.patient_id = $1
        ORDER BY s.time_created DESC, m.repetition ASC
        LIMIT $2
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(patient_id)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list patient metrics")?;
    Ok(rows
        .iter()
        .map(|row| PatientMetricEntry {
            metric: metric_entry(row),
            exercise_type: row.get("exercise_type"),
        })
        .collect())
}

fn session_detail(row: &sqlx::postgres::PgRow) -> SessionDetail {
    SessionDetail {
        id: row.get::<Uuid, _>("id").to_string(),
        patient_id: row.get::<Uuid, _>("patient_id").to_string(),
        exercise_type: row.get("exercise_type"),
        exercise_description: row.get("exercise_description"),
        repetitions: row.get("repetitions"),
        duration: row.get("duration"),
        time_created: row.get("time_created"),
    }
}

fn metric_entry(row: &sqlx::postgres::PgRow) -> MetricEntry {
    MetricEntry {
        id: row.get::<Uuid, _>("id").to_string(),
        session_id: row.get::<Uuid, _>("session_id").to_string(),
        joint: row.get("joint"),
        side: row.get("side"),
        repetition: row.get("repetition"),
        min_velocity: row.get("min_velocity"),
        max_velocity: row.get("max_velocity"),
        avg_velocity: row.get("avg_velocity"),
        p95_velocity: row.get("p95_velocity"),
        min_rom: row.get("min_rom"),
        max_rom: row.get("max_rom"),
        avg_rom: row.get("avg_rom"),
        center_mass_displacement: row.get("center_mass_displacement"),
        time_created: row.get("time_created"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_joint_defaults_to_knee_and_skips_others() {
        assert_eq!(normalize_joint(None), Some("knee"));
        assert_eq!(normalize_joint(Some(" Hip ")), Some("hip"));
        assert_eq!(normalize_joint(Some("com")), None);
        assert_eq!(normalize_joint(Some("ankle")), None);
    }

    #[test]
    fn normalize_side_defaults_to_left() {
        assert_eq!(normalize_side(None), "left");
        assert_eq!(normalize_side(Some("both")), "left");
        assert_eq!(normalize_side(Some("RIGHT")), "right");
    }
}
