//! Typed outcomes crossing the auth boundary.
//!
//! Expected rejections (bad codes, duplicate logins) are outcome values, not
//! errors; infrastructure failures travel separately as `anyhow::Error`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Verbatim user-facing messages for field-tagged rejections.
pub mod messages {
    pub const LOGIN_ALREADY_EXISTS: &str = "User with this login already exists";
    pub const EMAIL_ALREADY_EXISTS: &str = "User with this email already exists";
    pub const EMAIL_NOT_FOUND: &str = "User with this email not found";
    pub const EMAIL_ALREADY_CONFIRMED: &str = "User with this email already confirmed";
    pub const INVALID_CONFIRMATION_CODE: &str = "Invalid confirmation code";
    pub const CONFIRMATION_CODE_EXPIRED: &str = "Confirmation code expired";
    pub const INVALID_RECOVERY_CODE: &str = "Invalid recovery code";
    pub const RECOVERY_CODE_EXPIRED: &str = "Recovery code expired";
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity extracted from a refresh token that passed full validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshContext {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

/// Login input: a single field tried against both login and email.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login_or_email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub login: String,
    pub email: String,
    pub password: String,
}

/// Public view of a freshly registered user (no credential material).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A rejection tied to a specific input field, reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    #[must_use]
    pub const fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created(RegisteredUser),
    Rejected(FieldError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    Rejected(FieldError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    Rejected(FieldError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PasswordResetOutcome {
    Updated,
    Rejected(FieldError),
}

/// Result of revoking a single session on behalf of a user.
#[derive(Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NotFound,
    Forbidden,
}
