//! Persistent records and the collaborator contracts the auth core consumes.
//!
//! The orchestrator owns no persisted state: the user directory owns `User`
//! records, the session store owns `Device` records, and each implementation
//! owns its own concurrency control.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Email-confirmation state embedded in a user record.
///
/// `code` and `code_expires_at` are both set or both `None`; a confirmed user
/// never holds a pending code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationInfo {
    pub confirmed: bool,
    pub code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
}

/// Password-recovery state embedded in a user record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryInfo {
    pub code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub confirmation: ConfirmationInfo,
    pub recovery: RecoveryInfo,
}

/// One logged-in client instance. Created at login, rotated in place on every
/// refresh, deleted on logout or expiry detection.
#[derive(Debug, Clone)]
pub struct Device {
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub ip: String,
    pub refresh_token: String,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of persisting a new user.
///
/// Duplicate keys surface as values so a registration that loses a race past
/// the orchestrator's pre-check still reports a field-tagged conflict.
#[derive(Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    DuplicateLogin,
    DuplicateEmail,
}

/// User lookup and mutation capability consumed by the orchestrator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Single lookup tried against both fields; login and email may differ.
    /// When the two fields match different users, the login match is returned.
    async fn find_by_login_or_email(&self, login: &str, email: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_confirmation_code(&self, code: &str) -> Result<Option<User>>;

    async fn find_by_recovery_code(&self, code: &str) -> Result<Option<User>>;

    async fn create(&self, user: User) -> Result<CreateUserOutcome>;

    /// Replace the pending confirmation code for an unconfirmed user.
    async fn update_confirmation_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Flip the user to confirmed and clear both confirmation fields.
    async fn confirm_user(&self, code: &str) -> Result<bool>;

    async fn update_recovery_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replace the password keyed by the recovery code, clearing the code so
    /// it cannot be replayed.
    async fn update_password_by_recovery_code(
        &self,
        code: &str,
        password_hash: &str,
    ) -> Result<bool>;
}

/// Per-device session capability consumed by the orchestrator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, device: Device) -> Result<()>;

    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Device>>;

    /// Rotate the refresh token in place. Must be atomic per device: two
    /// racing rotations may not both leave their token behind.
    async fn update_refresh_token(
        &self,
        device_id: Uuid,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn delete_by_device_id(&self, device_id: Uuid) -> Result<bool>;

    async fn delete_other_devices_by_user_id(
        &self,
        user_id: Uuid,
        keep_device_id: Uuid,
    ) -> Result<u64>;
}
