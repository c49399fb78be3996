//! In-memory store implementations for tests and embedded use.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CreateUserOutcome, Device, SessionStore, User, UserDirectory};

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_login_or_email(&self, login: &str, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        // Login matches win when both fields hit different users.
        if let Some(user) = users.values().find(|user| user.login == login) {
            return Ok(Some(user.clone()));
        }
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_confirmation_code(&self, code: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|user| user.confirmation.code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_by_recovery_code(&self, code: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|user| user.recovery.code.as_deref() == Some(code))
            .cloned())
    }

    async fn create(&self, user: User) -> Result<CreateUserOutcome> {
        // Duplicates are caught under the same lock guard as the insert, so
        // racing creates resolve the same way the unique indexes would.
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.login == user.login) {
            return Ok(CreateUserOutcome::DuplicateLogin);
        }
        if users.values().any(|existing| existing.email == user.email) {
            return Ok(CreateUserOutcome::DuplicateEmail);
        }
        users.insert(user.id, user);
        Ok(CreateUserOutcome::Created)
    }

    async fn update_confirmation_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut users = self.users.lock().await;
        let Some(user) = users
            .values_mut()
            .find(|user| user.email == email && !user.confirmation.confirmed)
        else {
            return Ok(false);
        };
        user.confirmation.code = Some(code.to_string());
        user.confirmation.code_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn confirm_user(&self, code: &str) -> Result<bool> {
        let mut users = self.users.lock().await;
        let Some(user) = users
            .values_mut()
            .find(|user| user.confirmation.code.as_deref() == Some(code))
        else {
            return Ok(false);
        };
        user.confirmation.confirmed = true;
        user.confirmation.code = None;
        user.confirmation.code_expires_at = None;
        Ok(true)
    }

    async fn update_recovery_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut users = self.users.lock().await;
        let Some(user) = users.values_mut().find(|user| user.email == email) else {
            return Ok(false);
        };
        user.recovery.code = Some(code.to_string());
        user.recovery.code_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn update_password_by_recovery_code(
        &self,
        code: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let mut users = self.users.lock().await;
        let Some(user) = users
            .values_mut()
            .find(|user| user.recovery.code.as_deref() == Some(code))
        else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        // Single use: a consumed recovery code must not be replayable.
        user.recovery.code = None;
        user.recovery.code_expires_at = None;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    devices: Mutex<HashMap<Uuid, Device>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, device: Device) -> Result<()> {
        let mut devices = self.devices.lock().await;
        devices.insert(device.device_id, device);
        Ok(())
    }

    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>> {
        let devices = self.devices.lock().await;
        Ok(devices.get(&device_id).cloned())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let devices = self.devices.lock().await;
        Ok(devices
            .values()
            .filter(|device| device.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_refresh_token(
        &self,
        device_id: Uuid,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        // The overwrite happens under one lock guard, so racing rotations
        // serialize and exactly one token survives.
        let mut devices = self.devices.lock().await;
        let Some(device) = devices.get_mut(&device_id) else {
            return Ok(false);
        };
        device.refresh_token = refresh_token.to_string();
        device.expires_at = expires_at;
        device.last_active_at = Utc::now();
        Ok(true)
    }

    async fn delete_by_device_id(&self, device_id: Uuid) -> Result<bool> {
        let mut devices = self.devices.lock().await;
        Ok(devices.remove(&device_id).is_some())
    }

    async fn delete_other_devices_by_user_id(
        &self,
        user_id: Uuid,
        keep_device_id: Uuid,
    ) -> Result<u64> {
        let mut devices = self.devices.lock().await;
        let before = devices.len();
        devices.retain(|id, device| device.user_id != user_id || *id == keep_device_id);
        Ok((before - devices.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConfirmationInfo, RecoveryInfo};
    use chrono::Duration;

    fn user(login: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            login: login.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            confirmation: ConfirmationInfo {
                confirmed: false,
                code: Some(format!("code-{login}")),
                code_expires_at: Some(Utc::now() + Duration::hours(24)),
            },
            recovery: RecoveryInfo::default(),
        }
    }

    fn device(user_id: Uuid) -> Device {
        let now = Utc::now();
        Device {
            device_id: Uuid::new_v4(),
            user_id,
            title: "test agent".to_string(),
            ip: "127.0.0.1".to_string(),
            refresh_token: "token-1".to_string(),
            last_active_at: now,
            created_at: now,
            expires_at: now + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn lookup_matches_either_login_or_email() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        directory.create(user("bob", "bob@x.com")).await?;

        let by_login = directory.find_by_login_or_email("bob", "other@x.com").await?;
        let by_email = directory.find_by_login_or_email("other", "bob@x.com").await?;
        let missing = directory.find_by_login_or_email("other", "other@x.com").await?;
        assert!(by_login.is_some());
        assert!(by_email.is_some());
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn create_reports_duplicate_login_before_email() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        assert_eq!(
            directory.create(user("bob", "bob@x.com")).await?,
            CreateUserOutcome::Created
        );

        // Login clash wins even when the email clashes too.
        assert_eq!(
            directory.create(user("bob", "bob@x.com")).await?,
            CreateUserOutcome::DuplicateLogin
        );
        assert_eq!(
            directory.create(user("other", "bob@x.com")).await?,
            CreateUserOutcome::DuplicateEmail
        );

        // Losers leave no record behind.
        assert!(directory.find_by_login_or_email("other", "none@x.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn confirm_user_clears_confirmation_fields() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        directory.create(user("bob", "bob@x.com")).await?;

        assert!(directory.confirm_user("code-bob").await?);
        let user = directory.find_by_email("bob@x.com").await?.expect("user");
        assert!(user.confirmation.confirmed);
        assert_eq!(user.confirmation.code, None);
        assert_eq!(user.confirmation.code_expires_at, None);

        // The cleared code no longer resolves.
        assert!(!directory.confirm_user("code-bob").await?);
        Ok(())
    }

    #[tokio::test]
    async fn update_confirmation_code_skips_confirmed_users() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        directory.create(user("bob", "bob@x.com")).await?;
        directory.confirm_user("code-bob").await?;

        let updated = directory
            .update_confirmation_code("bob@x.com", "fresh", Utc::now())
            .await?;
        assert!(!updated);
        Ok(())
    }

    #[tokio::test]
    async fn recovery_code_is_single_use() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        directory.create(user("bob", "bob@x.com")).await?;
        directory
            .update_recovery_code("bob@x.com", "rec-1", Utc::now() + Duration::hours(24))
            .await?;

        assert!(
            directory
                .update_password_by_recovery_code("rec-1", "new-hash")
                .await?
        );
        let user = directory.find_by_email("bob@x.com").await?.expect("user");
        assert_eq!(user.password_hash, "new-hash");
        assert_eq!(user.recovery, RecoveryInfo::default());

        assert!(
            !directory
                .update_password_by_recovery_code("rec-1", "other-hash")
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn rotation_overwrites_token_and_bumps_activity() -> Result<()> {
        let store = MemorySessionStore::new();
        let device = device(Uuid::new_v4());
        let device_id = device.device_id;
        let previous_activity = device.last_active_at;
        store.create(device).await?;

        let expires_at = Utc::now() + Duration::days(7);
        assert!(store.update_refresh_token(device_id, "token-2", expires_at).await?);

        let stored = store.find_by_device_id(device_id).await?.expect("device");
        assert_eq!(stored.refresh_token, "token-2");
        assert_eq!(stored.expires_at, expires_at);
        assert!(stored.last_active_at >= previous_activity);
        Ok(())
    }

    #[tokio::test]
    async fn delete_other_devices_keeps_the_current_one() -> Result<()> {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let kept = device(user_id);
        let kept_id = kept.device_id;
        store.create(kept).await?;
        store.create(device(user_id)).await?;
        store.create(device(user_id)).await?;
        store.create(device(Uuid::new_v4())).await?;

        let deleted = store.delete_other_devices_by_user_id(user_id, kept_id).await?;
        assert_eq!(deleted, 2);
        assert!(store.find_by_device_id(kept_id).await?.is_some());
        assert_eq!(store.find_by_user_id(user_id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn double_delete_reports_missing() -> Result<()> {
        let store = MemorySessionStore::new();
        let device = device(Uuid::new_v4());
        let device_id = device.device_id;
        store.create(device).await?;

        assert!(store.delete_by_device_id(device_id).await?);
        assert!(!store.delete_by_device_id(device_id).await?);
        Ok(())
    }
}
