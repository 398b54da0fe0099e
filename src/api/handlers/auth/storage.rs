//! Database helpers for login, signup and token resolution.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::principal::Role;

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(Uuid),
    Conflict,
}

/// Fields needed to check a password at login.
pub(super) struct LoginRecord {
    pub(super) user_id: Uuid,
    pub(super) email: String,
    pub(super) password_hash: String,
    pub(super) first_name: String,
    pub(super) last_name: String,
}

/// Minimal user data backing a verified token.
pub(crate) struct UserRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) role: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
}

/// Look up login data by email and role. Inactive or deleted accounts never match.
pub(super) async fn lookup_login_record(
    pool: &PgPool,
    email: &str,
    role: Role,
) -> Result<Option<LoginRecord>> {
    let query = r"
        SELECT id, email, password_hash, first_name, last_name
        FROM users
        WHERE email = $1
          AND role = $2
          AND active
          AND NOT deleted
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(role.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
    }))
}

/// Create a user and, for patients, an empty patient record in one transaction.
pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    role: Role,
    first_name: &str,
    last_name: &str,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users (id, email, password_hash, role, first_name, last_name, active, deleted)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, FALSE)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let user_id = Uuid::new_v4();
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(first_name)
        .bind(last_name)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = result {
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(SignupOutcome::Conflict);
        }
        return Err(err).context("failed to insert user");
    }

    if role == Role::Patient {
        insert_empty_patient(&mut tx, user_id).await?;
    }

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created(user_id))
}

/// Create a minimal patients row so later detail updates have a target.
pub(crate) async fn insert_empty_patient(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = r"
        INSERT INTO patients (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert patient record")?;
    Ok(())
}

/// Load the user behind a verified token. Inactive or deleted accounts return None.
pub(crate) async fn fetch_active_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, role, first_name, last_name
        FROM users
        WHERE id = $1
          AND active
          AND NOT deleted
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    Ok(row.map(|row| UserRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        role: row.get("role"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
    }))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23503"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", SignupOutcome::Created(Uuid::nil())),
            format!("Created({})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }

    #[test]
    fn is_unique_violation_ignores_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn is_foreign_key_violation_ignores_other_errors() {
        assert!(!is_foreign_key_violation(&sqlx::Error::RowNotFound));
        assert!(!is_foreign_key_violation(&sqlx::Error::PoolClosed));
    }
}
