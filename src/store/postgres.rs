//! Postgres-backed store adapters.
//!
//! Runtime `sqlx` queries, each wrapped in a `db.query` span. One row per
//! device; refresh rotation is a single `UPDATE`, so concurrent rotations on
//! the same device serialize on the row and exactly one token survives.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    ConfirmationInfo, CreateUserOutcome, Device, RecoveryInfo, SessionStore, User, UserDirectory,
};

/// Map a duplicate-key insert to the offending field.
///
/// SQLSTATE 23505 is `unique_violation`; the constraint names come from the
/// inline UNIQUE columns in the users table. Login wins when the constraint
/// name is unavailable, matching the lookup precedence.
fn unique_conflict(err: &sqlx::Error) -> Option<CreateUserOutcome> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    match db_err.constraint() {
        Some("users_email_key") => Some(CreateUserOutcome::DuplicateEmail),
        _ => Some(CreateUserOutcome::DuplicateLogin),
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, query: &str, bind: &str) -> Result<Option<User>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        Ok(row.map(|row| user_from_row(&row)))
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        login: row.get("login"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        confirmation: ConfirmationInfo {
            confirmed: row.get("is_confirmed"),
            code: row.get("confirmation_code"),
            code_expires_at: row.get("confirmation_code_expires_at"),
        },
        recovery: RecoveryInfo {
            code: row.get("recovery_code"),
            code_expires_at: row.get("recovery_code_expires_at"),
        },
    }
}

const USER_COLUMNS: &str = r"
    id, login, email, password_hash, created_at,
    is_confirmed, confirmation_code, confirmation_code_expires_at,
    recovery_code, recovery_code_expires_at
";

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_login_or_email(&self, login: &str, email: &str) -> Result<Option<User>> {
        // Login matches sort first so a double collision reports the login.
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE login = $1 OR email = $2 \
             ORDER BY (login = $1) DESC LIMIT 1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(login)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by login or email")?;
        Ok(row.map(|row| user_from_row(&row)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
        self.find_one(&query, email).await
    }

    async fn find_by_confirmation_code(&self, code: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE confirmation_code = $1 LIMIT 1");
        self.find_one(&query, code).await
    }

    async fn find_by_recovery_code(&self, code: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE recovery_code = $1 LIMIT 1");
        self.find_one(&query, code).await
    }

    async fn create(&self, user: User) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users
                (id, login, email, password_hash, created_at,
                 is_confirmed, confirmation_code, confirmation_code_expires_at,
                 recovery_code, recovery_code_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.login)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.confirmation.confirmed)
            .bind(&user.confirmation.code)
            .bind(user.confirmation.code_expires_at)
            .bind(&user.recovery.code)
            .bind(user.recovery.code_expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await;
        match result {
            Ok(_) => Ok(CreateUserOutcome::Created),
            // The unique indexes are the authority; an insert losing a race
            // past the caller's pre-check still reports which field clashed.
            Err(err) => match unique_conflict(&err) {
                Some(conflict) => Ok(conflict),
                None => Err(err).context("failed to insert user"),
            },
        }
    }

    async fn update_confirmation_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET confirmation_code = $2,
                confirmation_code_expires_at = $3
            WHERE email = $1
              AND is_confirmed = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .bind(code)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update confirmation code")?;
        Ok(result.rows_affected() > 0)
    }

    async fn confirm_user(&self, code: &str) -> Result<bool> {
        // Confirmation is terminal; both code fields are cleared in the same
        // statement so the code cannot resolve twice.
        let query = r"
            UPDATE users
            SET is_confirmed = TRUE,
                confirmation_code = NULL,
                confirmation_code_expires_at = NULL
            WHERE confirmation_code = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(code)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to confirm user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_recovery_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET recovery_code = $2,
                recovery_code_expires_at = $3
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .bind(code)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update recovery code")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_password_by_recovery_code(
        &self,
        code: &str,
        password_hash: &str,
    ) -> Result<bool> {
        // Clearing the code in the same statement makes it single use.
        let query = r"
            UPDATE users
            SET password_hash = $2,
                recovery_code = NULL,
                recovery_code_expires_at = NULL
            WHERE recovery_code = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(code)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password by recovery code")?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Device {
    Device {
        device_id: row.get("device_id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        ip: row.get("ip"),
        refresh_token: row.get("refresh_token"),
        last_active_at: row.get("last_active_at"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, device: Device) -> Result<()> {
        let query = r"
            INSERT INTO devices
                (device_id, user_id, title, ip, refresh_token,
                 last_active_at, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(device.device_id)
            .bind(device.user_id)
            .bind(&device.title)
            .bind(&device.ip)
            .bind(&device.refresh_token)
            .bind(device.last_active_at)
            .bind(device.created_at)
            .bind(device.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert device session")?;
        Ok(())
    }

    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>> {
        let query = "SELECT * FROM devices WHERE device_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup device session")?;
        Ok(row.map(|row| device_from_row(&row)))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let query = "SELECT * FROM devices WHERE user_id = $1 ORDER BY created_at";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list device sessions")?;
        Ok(rows.iter().map(device_from_row).collect())
    }

    async fn update_refresh_token(
        &self,
        device_id: Uuid,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE devices
            SET refresh_token = $2,
                expires_at = $3,
                last_active_at = NOW()
            WHERE device_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(device_id)
            .bind(refresh_token)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate refresh token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_device_id(&self, device_id: Uuid) -> Result<bool> {
        let query = "DELETE FROM devices WHERE device_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(device_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete device session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_other_devices_by_user_id(
        &self,
        user_id: Uuid,
        keep_device_id: Uuid,
    ) -> Result<u64> {
        let query = "DELETE FROM devices WHERE user_id = $1 AND device_id <> $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(keep_device_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete other device sessions")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct FakeDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &'static str {
            "fake database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    fn db_error(code: Option<&'static str>, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError { code, constraint }))
    }

    #[test]
    fn unique_conflict_maps_constraints_to_fields() {
        let err = db_error(Some("23505"), Some("users_login_key"));
        assert_eq!(unique_conflict(&err), Some(CreateUserOutcome::DuplicateLogin));

        let err = db_error(Some("23505"), Some("users_email_key"));
        assert_eq!(unique_conflict(&err), Some(CreateUserOutcome::DuplicateEmail));

        // Unknown constraint still reports a conflict, on the login field.
        let err = db_error(Some("23505"), None);
        assert_eq!(unique_conflict(&err), Some(CreateUserOutcome::DuplicateLogin));
    }

    #[test]
    fn unique_conflict_ignores_other_errors() {
        let err = db_error(Some("99999"), Some("users_login_key"));
        assert_eq!(unique_conflict(&err), None);

        assert_eq!(unique_conflict(&sqlx::Error::RowNotFound), None);
    }
}
