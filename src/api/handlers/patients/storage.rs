//! Database helpers for patient records, assignment and feedback.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::types::{
    FeedbackEntry, FeedbackItem, ManualPatientRequest, PatientDetail, PatientDetailsUpdate,
    PatientSummary,
};

/// Outcome when assigning a patient to a doctor.
#[derive(Debug)]
pub(super) enum AssignOutcome {
    Assigned { relation_id: Uuid },
    PatientNotFound,
}

/// Patients with no active doctor relation, oldest account first.
pub(super) async fn list_unassigned(pool: &PgPool) -> Result<Vec<PatientSummary>> {
    let query = r"
        SELECT u.id, u.first_name, u.last_name, u.email
        FROM users u
        WHERE u.role = 'patient'
          AND u.active
          AND NOT u.deleted
          AND NOT EXISTS (
              SELECT 1 FROM patient_doctor pd
              WHERE pd.patient_id = u.id AND pd.active
          )
        ORDER BY u.time_created ASC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list unassigned patients")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            PatientSummary {
                id: row.get::<Uuid, _>("id").to_string(),
                name: format!("{first} {last}").trim().to_string(),
                email: row.get("email"),
            }
        })
        .collect())
}

/// Does an active patient account with this id exist?
pub(crate) async fn patient_exists(pool: &PgPool, patient_id: Uuid) -> Result<bool> {
    let query = r"
        SELECT 1 AS one
        FROM users
        WHERE id = $1
          AND role = 'patient'
          AND active
          AND NOT deleted
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(patient_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check patient existence")?;
    Ok(row.is_some())
}

/// Create a patient account with a placeholder email and assign it to the
/// creating doctor, all in one transaction. Returns the new user id and the
/// generated email.
pub(super) async fn create_manual_patient(
    pool: &PgPool,
    doctor_id: Uuid,
    request: &ManualPatientRequest,
    password_hash: &str,
) -> Result<(Uuid, String)> {
    let mut tx = pool
        .begin()
        .await
        .context("begin manual patient transaction")?;

    let patient_id = Uuid::new_v4();
    let email = placeholder_email(patient_id);

    let query = r"
        INSERT INTO users (id, email, password_hash, role, first_name, last_name, active, deleted)
        VALUES ($1, $2, $3, 'patient', $4, $5, TRUE, FALSE)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(patient_id)
        .bind(&email)
        .bind(password_hash)
        .bind(request.first_name.trim())
        .bind(request.last_name.trim())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert manual patient user")?;

    let height_cm = request.height.map(|meters| meters * 100.0);
    let bmi = request.bmi.or_else(|| derive_bmi(request.weight, height_cm));

    let query = r"
        INSERT INTO patients
            (user_id, birth_date, sex, weight, height, bmi,
             occupation, education, medical_history,
             time_after_symptoms, leg_dominance, physically_active,
             affected_right_knee, affected_left_knee,
             affected_right_hip, affected_left_hip)
        VALUES ($1, $2::date, $3, $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15, $16)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(patient_id)
        .bind(&request.birth_date)
        .bind(&request.sex)
        .bind(request.weight)
        .bind(height_cm)
        .bind(bmi)
        .bind(&request.occupation)
        .bind(&request.education)
        .bind(&request.medical_history)
        .bind(&request.time_after_symptoms)
        .bind(&request.leg_dominance)
        .bind(request.physically_active)
        .bind(request.affected_right_knee)
        .bind(request.affected_left_knee)
        .bind(request.affected_right_hip)
        .bind(request.affected_left_hip)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert manual patient details")?;

    insert_active_relation(&mut tx, patient_id, doctor_id).await?;

    tx.commit()
        .await
        .context("commit manual patient transaction")?;

    Ok((patient_id, email))
}

/// Assign a patient to a doctor. Any previously active relation for the
/// patient is deactivated in the same transaction so exactly one stays active.
pub(super) async fn assign_patient(
    pool: &PgPool,
    patient_id: Uuid,
    doctor_id: Uuid,
) -> Result<AssignOutcome> {
    if !patient_exists(pool, patient_id).await? {
        return Ok(AssignOutcome::PatientNotFound);
    }

    let mut tx = pool.begin().await.context("begin assign transaction")?;

    let query = r"
        UPDATE patient_doctor
        SET active = FALSE,
            time_active = NOW()
        WHERE patient_id = $1 AND active
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(patient_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to deactivate previous relations")?;

    let relation_id = insert_active_relation(&mut tx, patient_id, doctor_id).await?;

    tx.commit().await.context("commit assign transaction")?;

    Ok(AssignOutcome::Assigned { relation_id })
}

async fn insert_active_relation(
    tx: &mut Transaction<'_, Postgres>,
    patient_id: Uuid,
    doctor_id: Uuid,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO patient_doctor (id, patient_id, doctor_id, active, time_active)
        VALUES ($1, $2, $3, TRUE, NOW())
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let relation_id = Uuid::new_v4();
    sqlx::query(query)
        .bind(relation_id)
        .bind(patient_id)
        .bind(doctor_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert doctor relation")?;
    Ok(relation_id)
}

/// Full patient profile: account fields joined with the clinical record.
pub(super) async fn fetch_patient_detail(
    pool: &PgPool,
    patient_id: Uuid,
) -> Result<Option<PatientDetail>> {
    let query = r"
        SELECT u.id, u.email, u.first_name, u.last_name,
               p.birth_date::text AS birth_date, p.sex, p.weight, p.height, p.bmi,
               p.occupation, p.education, p.medical_history,
               p.time_after_symptoms, p.leg_dominance, p.physically_active,
               p.affected_right_knee, p.affected_left_knee,
               p.affected_right_hip, p.affected_left_hip
        FROM users u
        LEFT JOIN patients p ON p.user_id = u.id
        WHERE u.id = $1
          AND u.role = 'patient'
          AND u.active
          AND NOT u.deleted
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
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch patient detail")?;

    Ok(row.map(|row| PatientDetail {
        id: row.get::<Uuid, _>("id").to_string(),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        birth_date: row.get("birth_date"),
        sex: row.get("sex"),
        weight: row.get("weight"),
        height: row.get("height"),
        bmi: row.get("bmi"),
        occupation: row.get("occupation"),
        education: row.get("education"),
        medical_history: row.get("medical_history"),
        time_after_symptoms: row.get("time_after_symptoms"),
        leg_dominance: row.get("leg_dominance"),
        physically_active: row.get("physically_active"),
        affected_right_knee: row.get("affected_right_knee"),
        affected_left_knee: row.get("affected_left_knee"),
        affected_right_hip: row.get("affected_right_hip"),
        affected_left_hip: row.get("affected_left_hip"),
    }))
}

/// Apply a partial clinical update. Fields left out of the request keep their
/// stored value; BMI is recomputed from the effective weight and height unless
/// the request sets it explicitly.
pub(super) async fn update_details(
    pool: &PgPool,
    patient_id: Uuid,
    update: &PatientDetailsUpdate,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin details transaction")?;

    // Self-signup leaves the patients row in place, but manual DB imports may
    // lack one.
    crate::api::handlers::auth::storage::insert_empty_patient(&mut tx, patient_id).await?;

    let height_cm = update.height.map(|meters| meters * 100.0);

    let query = r"
        UPDATE patients
        SET weight = COALESCE($2, weight),
            height = COALESCE($3, height),
            bmi = COALESCE($4, bmi),
            sex = COALESCE($5, sex),
            medical_history = COALESCE($6, medical_history)
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(patient_id)
        .bind(update.weight)
        .bind(height_cm)
        .bind(update.bmi)
        .bind(&update.sex)
        .bind(&update.medical_history)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update patient details")?;

    if update.bmi.is_none() && (update.weight.is_some() || update.height.is_some()) {
        let query = r"
            UPDATE patients
            SET bmi = weight / ((height / 100.0) * (height / 100.0))
            WHERE user_id = $1
              AND weight IS NOT NULL
              AND height IS NOT NULL
              AND height > 0
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(patient_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to recompute bmi")?;
    }

    tx.commit().await.context("commit details transaction")?;

    Ok(())
}

/// Outcome when storing a feedback batch.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum FeedbackOutcome {
    Inserted,
    UnknownSession,
}

/// Store a batch of feedback entries in one transaction. A session id that
/// does not resolve rolls the whole batch back.
pub(super) async fn insert_feedback(
    pool: &PgPool,
    patient_id: Uuid,
    items: &[(Option<Uuid>, FeedbackItem)],
) -> Result<FeedbackOutcome> {
    let mut tx = pool.begin().await.context("begin feedback transaction")?;

    let query = r"
        INSERT INTO patient_feedback
            (id, patient_id, session_id, pain, fatigue, difficulty, comments)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
    ";
    for (session_id, item) in items {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(patient_id)
            .bind(session_id)
            .bind(item.pain)
            .bind(item.fatigue)
            .bind(item.difficulty)
            .bind(&item.comments)
            .execute(&mut *tx)
            .instrument(span)
            .await;

        if let Err(err) = result {
            // The patient row is checked by the handler, so a FK failure
            // here means the session id does not exist.
            if crate::api::handlers::auth::storage::is_foreign_key_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(FeedbackOutcome::UnknownSession);
            }
            return Err(err).context("failed to insert feedback entry");
        }
    }

    tx.commit().await.context("commit feedback transaction")?;

    Ok(FeedbackOutcome::Inserted)
}

/// Feedback history for a patient, newest first.
pub(super) async fn list_feedback(pool: &PgPool, patient_id: Uuid) -> Result<Vec<FeedbackEntry>> {
    let query = r#"
        SELECT id, session_id, pain, fatigue, difficulty, comments,
               to_char(time_created, 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS time_created
        FROM patient_feedback
        WHERE patient_id = $1
        ORDER BY time_created DESC
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(patient_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list feedback")?;

    Ok(rows
        .into_iter()
        .map(|row| FeedbackEntry {
            id: row.get::<Uuid, _>("id").to_string(),
            session_id: row
                .get::<Option<Uuid>, _>("session_id")
                .map(|id| id.to_string()),
            pain: row.get("pain"),
            fatigue: row.get("fatigue"),
            difficulty: row.get("difficulty"),
            comments: row.get("comments"),
            time_created: row.get("time_created"),
        })
        .collect())
}

fn placeholder_email(patient_id: Uuid) -> String {
    let id = patient_id.simple().to_string();
    format!("patient_{}@irhis.local", &id[..8])
}

fn derive_bmi(weight: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    match (weight, height_cm) {
        (Some(weight), Some(height)) if height > 0.0 => {
            let meters = height / 100.0;
            Some(weight / (meters * meters))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_email_uses_id_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").expect("uuid");
        assert_eq!(placeholder_email(id), "patient_a1b2c3d4@irhis.local");
    }

    #[test]
    fn derive_bmi_needs_both_measurements() {
        assert!(derive_bmi(Some(80.0), None).is_none());
        assert!(derive_bmi(None, Some(180.0)).is_none());
        assert!(derive_bmi(Some(80.0), Some(0.0)).is_none());

        let bmi = derive_bmi(Some(81.0), Some(180.0)).expect("bmi");
        assert!((bmi - 25.0).abs() < 0.01);
    }
}
