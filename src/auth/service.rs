//! The auth orchestrator: a state machine over (user, device) pairs.
//!
//! Every operation returns a typed outcome; cryptographic verification
//! failures never escape as errors. Store and mailer failures do propagate,
//! uncaught, so the caller can map them to a server-error response.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::email::NotificationGateway;
use crate::store::{
    ConfirmationInfo, CreateUserOutcome, Device, RecoveryInfo, SessionStore, User, UserDirectory,
};

use super::config::AuthConfig;
use super::password::PasswordHasher;
use super::tokens::TokenCodec;
use super::types::{
    messages, ConfirmOutcome, Credentials, FieldError, PasswordResetOutcome, RefreshContext,
    RegisteredUser, RegistrationOutcome, RegistrationRequest, ResendOutcome, RevokeOutcome,
    TokenPair,
};
use super::utils::{generate_code, normalize_email, valid_email};

/// Coordinates the user directory, session store, token codec, password
/// hasher, and notification gateway. Owns no persisted state itself.
pub struct AuthService {
    config: AuthConfig,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    mailer: Arc<dyn NotificationGateway>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        tokens: TokenCodec,
        hasher: PasswordHasher,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
        mailer: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            config,
            tokens,
            hasher,
            users,
            sessions,
            mailer,
        }
    }

    /// Verify credentials and mint a new per-device session.
    ///
    /// Returns `None` for unknown users and wrong passwords alike; the two
    /// cases are indistinguishable to the caller.
    pub async fn login(
        &self,
        credentials: &Credentials,
        device_title: &str,
        ip: &str,
    ) -> Result<Option<TokenPair>> {
        let lookup = credentials.login_or_email.trim();
        let Some(user) = self
            .users
            .find_by_login_or_email(lookup, &normalize_email(lookup))
            .await?
        else {
            debug!("login rejected: unknown login or email");
            return Ok(None);
        };

        if !self
            .verify_password(credentials.password.clone(), user.password_hash.clone())
            .await?
        {
            debug!(user_id = %user.id, "login rejected: password mismatch");
            return Ok(None);
        }

        let device_id = Uuid::new_v4();
        let now = Utc::now();
        let refresh_token = self.tokens.issue_refresh_token(user.id, device_id)?;
        self.sessions
            .create(Device {
                device_id,
                user_id: user.id,
                title: device_title.to_string(),
                ip: ip.to_string(),
                refresh_token: refresh_token.clone(),
                last_active_at: now,
                created_at: now,
                expires_at: now + Duration::seconds(self.config.refresh_token_ttl_seconds()),
            })
            .await?;

        let access_token = self.tokens.issue_access_token(user.id)?;
        Ok(Some(TokenPair {
            access_token,
            refresh_token,
        }))
    }

    /// Rotate the refresh token for an already-validated session.
    ///
    /// The previous token value becomes permanently invalid through the
    /// overwrite; there is no blacklist. A session past its expiry is deleted
    /// on detection.
    pub async fn refresh_session(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<Option<TokenPair>> {
        let Some(device) = self.sessions.find_by_device_id(device_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if now > device.expires_at {
            self.sessions.delete_by_device_id(device_id).await?;
            debug!(device_id = %device_id, "refresh rejected: session expired");
            return Ok(None);
        }

        let refresh_token = self.tokens.issue_refresh_token(user_id, device_id)?;
        let expires_at = now + Duration::seconds(self.config.refresh_token_ttl_seconds());
        if !self
            .sessions
            .update_refresh_token(device_id, &refresh_token, expires_at)
            .await?
        {
            return Ok(None);
        }

        let access_token = self.tokens.issue_access_token(user_id)?;
        Ok(Some(TokenPair {
            access_token,
            refresh_token,
        }))
    }

    /// Delete the session row. Double logout is not an error.
    pub async fn logout(&self, device_id: Uuid) -> Result<bool> {
        self.sessions.delete_by_device_id(device_id).await
    }

    /// Full refresh-token validation for the inbound refresh-cookie guard.
    ///
    /// Signature and expiry checks first, then the anti-replay check: the
    /// presented token must equal the currently stored one exactly. A
    /// verified-but-superseded token is rejected.
    pub async fn validate_refresh_token(&self, token: &str) -> Result<Option<RefreshContext>> {
        let claims = match self.tokens.verify_refresh_token(token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(%err, "refresh token rejected");
                return Ok(None);
            }
        };
        let Some(device_id) = claims.device_id else {
            return Ok(None);
        };

        let Some(device) = self.sessions.find_by_device_id(device_id).await? else {
            return Ok(None);
        };
        if device.refresh_token != token {
            debug!(device_id = %device_id, "refresh token superseded");
            return Ok(None);
        }
        if Utc::now() > device.expires_at {
            self.sessions.delete_by_device_id(device_id).await?;
            return Ok(None);
        }

        Ok(Some(RefreshContext {
            user_id: claims.user_id,
            device_id,
        }))
    }

    /// Create an unconfirmed user and dispatch the confirmation email.
    ///
    /// The user stays persisted even if the send fails; the transport error
    /// propagates unmasked.
    pub async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome> {
        let email = normalize_email(&request.email);
        if let Some(existing) = self
            .users
            .find_by_login_or_email(&request.login, &email)
            .await?
        {
            // Login is checked before email when both collide.
            let error = if existing.login == request.login {
                FieldError::new("login", messages::LOGIN_ALREADY_EXISTS)
            } else {
                FieldError::new("email", messages::EMAIL_ALREADY_EXISTS)
            };
            return Ok(RegistrationOutcome::Rejected(error));
        }

        let password_hash = self.hash_password(request.password).await?;
        let confirmation_code = generate_code()?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            login: request.login,
            email: email.clone(),
            password_hash,
            created_at: now,
            confirmation: ConfirmationInfo {
                confirmed: false,
                code: Some(confirmation_code.clone()),
                code_expires_at: Some(
                    now + Duration::seconds(self.config.confirmation_code_ttl_seconds()),
                ),
            },
            recovery: RecoveryInfo::default(),
        };
        let registered = RegisteredUser {
            id: user.id,
            login: user.login.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        };

        // A registration racing past the pre-check loses at the store; the
        // duplicate still maps to the same field-tagged rejection.
        match self.users.create(user).await? {
            CreateUserOutcome::Created => {}
            CreateUserOutcome::DuplicateLogin => {
                return Ok(RegistrationOutcome::Rejected(FieldError::new(
                    "login",
                    messages::LOGIN_ALREADY_EXISTS,
                )));
            }
            CreateUserOutcome::DuplicateEmail => {
                return Ok(RegistrationOutcome::Rejected(FieldError::new(
                    "email",
                    messages::EMAIL_ALREADY_EXISTS,
                )));
            }
        }
        self.mailer
            .send_confirmation_email(&email, &confirmation_code)
            .await?;

        Ok(RegistrationOutcome::Created(registered))
    }

    /// Replace the pending confirmation code and resend the email.
    pub async fn resend_confirmation_email(&self, email: &str) -> Result<ResendOutcome> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(ResendOutcome::Rejected(FieldError::new(
                "email",
                messages::EMAIL_NOT_FOUND,
            )));
        };
        if user.confirmation.confirmed {
            return Ok(ResendOutcome::Rejected(FieldError::new(
                "email",
                messages::EMAIL_ALREADY_CONFIRMED,
            )));
        }

        let code = generate_code()?;
        let expires_at = Utc::now() + Duration::seconds(self.config.confirmation_code_ttl_seconds());
        // The update touches unconfirmed rows only; a user confirmed after the
        // check above gets the rejection, not a stale code in the mail.
        if !self
            .users
            .update_confirmation_code(&email, &code, expires_at)
            .await?
        {
            return Ok(ResendOutcome::Rejected(FieldError::new(
                "email",
                messages::EMAIL_ALREADY_CONFIRMED,
            )));
        }
        self.mailer.send_confirmation_email(&email, &code).await?;
        Ok(ResendOutcome::Sent)
    }

    /// Flip the user to confirmed if the code is known and still live.
    ///
    /// Confirmation clears the code, so a repeat attempt resolves no user and
    /// reports an invalid code; confirmed is a terminal state.
    pub async fn confirm_registration(&self, code: &str) -> Result<ConfirmOutcome> {
        let Some(user) = self.users.find_by_confirmation_code(code).await? else {
            return Ok(ConfirmOutcome::Rejected(FieldError::new(
                "code",
                messages::INVALID_CONFIRMATION_CODE,
            )));
        };
        if let Some(expires_at) = user.confirmation.code_expires_at {
            if Utc::now() > expires_at {
                return Ok(ConfirmOutcome::Rejected(FieldError::new(
                    "code",
                    messages::CONFIRMATION_CODE_EXPIRED,
                )));
            }
        }

        self.users.confirm_user(code).await?;
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Start password recovery for an email address.
    ///
    /// Always succeeds from the caller's perspective; an unknown or malformed
    /// address only skips the send.
    pub async fn request_password_recovery(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(());
        }
        if self.users.find_by_email(&email).await?.is_none() {
            return Ok(());
        }

        let code = generate_code()?;
        let expires_at = Utc::now() + Duration::seconds(self.config.recovery_code_ttl_seconds());
        self.users
            .update_recovery_code(&email, &code, expires_at)
            .await?;
        self.mailer
            .send_password_recovery_email(&email, &code)
            .await?;
        Ok(())
    }

    /// Complete recovery: replace the password keyed by the recovery code.
    /// The code is consumed on success and cannot be replayed.
    pub async fn set_new_password(
        &self,
        recovery_code: &str,
        new_password: &str,
    ) -> Result<PasswordResetOutcome> {
        let Some(user) = self.users.find_by_recovery_code(recovery_code).await? else {
            return Ok(PasswordResetOutcome::Rejected(FieldError::new(
                "recoveryCode",
                messages::INVALID_RECOVERY_CODE,
            )));
        };
        if let Some(expires_at) = user.recovery.code_expires_at {
            if Utc::now() > expires_at {
                return Ok(PasswordResetOutcome::Rejected(FieldError::new(
                    "recoveryCode",
                    messages::RECOVERY_CODE_EXPIRED,
                )));
            }
        }

        let password_hash = self.hash_password(new_password.to_string()).await?;
        self.users
            .update_password_by_recovery_code(recovery_code, &password_hash)
            .await?;
        Ok(PasswordResetOutcome::Updated)
    }

    /// List the live sessions belonging to a user.
    pub async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Device>> {
        self.sessions.find_by_user_id(user_id).await
    }

    /// Revoke one session on behalf of its owner.
    pub async fn revoke_session(&self, user_id: Uuid, device_id: Uuid) -> Result<RevokeOutcome> {
        let Some(device) = self.sessions.find_by_device_id(device_id).await? else {
            return Ok(RevokeOutcome::NotFound);
        };
        if device.user_id != user_id {
            return Ok(RevokeOutcome::Forbidden);
        }
        self.sessions.delete_by_device_id(device_id).await?;
        Ok(RevokeOutcome::Revoked)
    }

    /// Bulk logout: drop every session of the user except the current one.
    pub async fn revoke_other_sessions(&self, user_id: Uuid, keep_device_id: Uuid) -> Result<u64> {
        self.sessions
            .delete_other_devices_by_user_id(user_id, keep_device_id)
            .await
    }

    // Argon2 work is CPU-bound; run it off the async scheduler.
    async fn hash_password(&self, password: String) -> Result<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")?
    }

    async fn verify_password(&self, password: String, password_hash: String) -> Result<bool> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .context("password verification task failed")
    }
}
