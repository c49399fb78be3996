//! JWT issuance and verification for access and refresh tokens.
//!
//! Two independent signing secrets separate the trust domains: an access
//! token never verifies against the refresh secret and vice versa.
//! Verification here is purely cryptographic/structural; matching a refresh
//! token against the session store is the orchestrator's job.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::config::AuthConfig;

/// Expected verification failures, returned as values rather than escaping
/// as exceptions across the auth boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or wrongly signed")]
    InvalidSignature,
    #[error("token is past its expiry")]
    Expired,
}

/// Identity carried by a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    /// Present on refresh tokens only; binds the token to one session.
    pub device_id: Option<Uuid>,
}

/// Wire shape of the signed payload.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<Uuid>,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let access_secret = config.access_token_secret().expose_secret().as_bytes();
        let refresh_secret = config.refresh_token_secret().expose_secret().as_bytes();
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl_seconds: config.access_token_ttl_seconds(),
            refresh_ttl_seconds: config.refresh_token_ttl_seconds(),
        }
    }

    /// Short-lived bearer token carrying the user identity only.
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id, None, self.access_ttl_seconds, &self.access_encoding)
            .context("failed to issue access token")
    }

    /// Longer-lived token bound to `{user_id, device_id}` so a stolen token
    /// cannot be replayed against a different session.
    pub fn issue_refresh_token(&self, user_id: Uuid, device_id: Uuid) -> Result<String> {
        self.issue(
            user_id,
            Some(device_id),
            self.refresh_ttl_seconds,
            &self.refresh_encoding,
        )
        .context("failed to issue refresh token")
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        verify(token, &self.access_decoding)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        verify(token, &self.refresh_decoding)
    }

    fn issue(
        &self,
        user_id: Uuid,
        device_id: Option<Uuid>,
        ttl_seconds: i64,
        key: &EncodingKey,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            device_id,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, key)?)
    }
}

fn verify(token: &str, key: &DecodingKey) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let data = decode::<Claims>(token, key, &validation).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::InvalidSignature,
    })?;
    // A subject that is not a user id is structurally invalid.
    let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::InvalidSignature)?;
    Ok(TokenClaims {
        user_id,
        device_id: data.claims.device_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
        )
    }

    #[test]
    fn access_token_round_trip() {
        let codec = TokenCodec::new(&config());
        let user_id = Uuid::new_v4();
        let token = codec.issue_access_token(user_id).expect("token");
        let claims = codec.verify_access_token(&token).expect("claims");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.device_id, None);
    }

    #[test]
    fn refresh_token_carries_device_binding() {
        let codec = TokenCodec::new(&config());
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let token = codec
            .issue_refresh_token(user_id, device_id)
            .expect("token");
        let claims = codec.verify_refresh_token(&token).expect("claims");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.device_id, Some(device_id));
    }

    #[test]
    fn secrets_do_not_cross_trust_domains() {
        let codec = TokenCodec::new(&config());
        let access = codec.issue_access_token(Uuid::new_v4()).expect("token");
        let refresh = codec
            .issue_refresh_token(Uuid::new_v4(), Uuid::new_v4())
            .expect("token");
        assert_eq!(
            codec.verify_refresh_token(&access),
            Err(TokenError::InvalidSignature)
        );
        assert_eq!(
            codec.verify_access_token(&refresh),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let config = config().with_access_token_ttl_seconds(-60);
        let codec = TokenCodec::new(&config);
        let token = codec.issue_access_token(Uuid::new_v4()).expect("token");
        assert_eq!(codec.verify_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_an_invalid_signature() {
        let codec = TokenCodec::new(&config());
        assert_eq!(
            codec.verify_access_token("not-a-token"),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let codec = TokenCodec::new(&config());
        let other = TokenCodec::new(&AuthConfig::new(
            SecretString::from("other-access".to_string()),
            SecretString::from("other-refresh".to_string()),
        ));
        let token = other.issue_access_token(Uuid::new_v4()).expect("token");
        assert_eq!(
            codec.verify_access_token(&token),
            Err(TokenError::InvalidSignature)
        );
    }
}
