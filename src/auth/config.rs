//! Auth configuration: signing secrets and security lifetimes.

use anyhow::{Context, Result};
use secrecy::SecretString;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CONFIRMATION_CODE_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RECOVERY_CODE_TTL_SECONDS: i64 = 24 * 60 * 60;

const ENV_ACCESS_SECRET: &str = "AUTH_ACCESS_TOKEN_SECRET";
const ENV_REFRESH_SECRET: &str = "AUTH_REFRESH_TOKEN_SECRET";
const ENV_ACCESS_TTL: &str = "AUTH_ACCESS_TOKEN_TTL_SECONDS";
const ENV_REFRESH_TTL: &str = "AUTH_REFRESH_TOKEN_TTL_SECONDS";
const ENV_CONFIRMATION_TTL: &str = "AUTH_CONFIRMATION_CODE_TTL_SECONDS";
const ENV_RECOVERY_TTL: &str = "AUTH_RECOVERY_CODE_TTL_SECONDS";

/// Security parameters for the auth core.
///
/// Access and refresh tokens are signed with independent secrets so the two
/// trust domains never overlap. All lifetimes are externally configurable.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    confirmation_code_ttl_seconds: i64,
    recovery_code_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(access_token_secret: SecretString, refresh_token_secret: SecretString) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            confirmation_code_ttl_seconds: DEFAULT_CONFIRMATION_CODE_TTL_SECONDS,
            recovery_code_ttl_seconds: DEFAULT_RECOVERY_CODE_TTL_SECONDS,
        }
    }

    /// Load the configuration from environment variables.
    ///
    /// The two secrets are required; lifetimes fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let access_secret = std::env::var(ENV_ACCESS_SECRET)
            .with_context(|| format!("{ENV_ACCESS_SECRET} is not set"))?;
        let refresh_secret = std::env::var(ENV_REFRESH_SECRET)
            .with_context(|| format!("{ENV_REFRESH_SECRET} is not set"))?;

        let mut config = Self::new(
            SecretString::from(access_secret),
            SecretString::from(refresh_secret),
        );
        if let Some(seconds) = ttl_from_env(ENV_ACCESS_TTL)? {
            config.access_token_ttl_seconds = seconds;
        }
        if let Some(seconds) = ttl_from_env(ENV_REFRESH_TTL)? {
            config.refresh_token_ttl_seconds = seconds;
        }
        if let Some(seconds) = ttl_from_env(ENV_CONFIRMATION_TTL)? {
            config.confirmation_code_ttl_seconds = seconds;
        }
        if let Some(seconds) = ttl_from_env(ENV_RECOVERY_TTL)? {
            config.recovery_code_ttl_seconds = seconds;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_confirmation_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.confirmation_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_recovery_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.recovery_code_ttl_seconds = seconds;
        self
    }

    pub(crate) fn access_token_secret(&self) -> &SecretString {
        &self.access_token_secret
    }

    pub(crate) fn refresh_token_secret(&self) -> &SecretString {
        &self.refresh_token_secret
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn confirmation_code_ttl_seconds(&self) -> i64 {
        self.confirmation_code_ttl_seconds
    }

    #[must_use]
    pub fn recovery_code_ttl_seconds(&self) -> i64 {
        self.recovery_code_ttl_seconds
    }
}

fn ttl_from_env(name: &str) -> Result<Option<i64>> {
    match std::env::var(name) {
        Ok(value) => {
            let seconds = value
                .parse::<i64>()
                .with_context(|| format!("{name} must be a number of seconds"))?;
            Ok(Some(seconds))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
        )
    }

    #[test]
    fn defaults_and_overrides() {
        let config = config();
        assert_eq!(
            config.access_token_ttl_seconds(),
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.confirmation_code_ttl_seconds(),
            DEFAULT_CONFIRMATION_CODE_TTL_SECONDS
        );
        assert_eq!(
            config.recovery_code_ttl_seconds(),
            DEFAULT_RECOVERY_CODE_TTL_SECONDS
        );

        let config = config
            .with_access_token_ttl_seconds(120)
            .with_refresh_token_ttl_seconds(3600)
            .with_confirmation_code_ttl_seconds(60)
            .with_recovery_code_ttl_seconds(30);
        assert_eq!(config.access_token_ttl_seconds(), 120);
        assert_eq!(config.refresh_token_ttl_seconds(), 3600);
        assert_eq!(config.confirmation_code_ttl_seconds(), 60);
        assert_eq!(config.recovery_code_ttl_seconds(), 30);
    }

    #[test]
    fn from_env_requires_secrets() {
        temp_env::with_vars_unset([ENV_ACCESS_SECRET, ENV_REFRESH_SECRET], || {
            assert!(AuthConfig::from_env().is_err());
        });
    }

    #[test]
    fn from_env_reads_secrets_and_ttl_overrides() {
        temp_env::with_vars(
            [
                (ENV_ACCESS_SECRET, Some("a-secret")),
                (ENV_REFRESH_SECRET, Some("r-secret")),
                (ENV_ACCESS_TTL, Some("90")),
                (ENV_REFRESH_TTL, None),
            ],
            || {
                let config = AuthConfig::from_env().expect("config");
                assert_eq!(config.access_token_ttl_seconds(), 90);
                assert_eq!(
                    config.refresh_token_ttl_seconds(),
                    DEFAULT_REFRESH_TOKEN_TTL_SECONDS
                );
            },
        );
    }

    #[test]
    fn from_env_rejects_non_numeric_ttl() {
        temp_env::with_vars(
            [
                (ENV_ACCESS_SECRET, Some("a-secret")),
                (ENV_REFRESH_SECRET, Some("r-secret")),
                (ENV_ACCESS_TTL, Some("soon")),
            ],
            || {
                assert!(AuthConfig::from_env().is_err());
            },
        );
    }
}
