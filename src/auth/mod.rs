//! The authentication core: credential verification, token issuance,
//! refresh-token rotation, and the confirmation/recovery code workflows.

pub mod config;
pub mod password;
pub mod service;
pub mod tokens;
pub mod types;
pub(crate) mod utils;

pub use config::AuthConfig;
pub use password::PasswordHasher;
pub use service::AuthService;
pub use tokens::{TokenClaims, TokenCodec, TokenError};
pub use types::{
    ConfirmOutcome, Credentials, FieldError, PasswordResetOutcome, RefreshContext, RegisteredUser,
    RegistrationOutcome, RegistrationRequest, ResendOutcome, RevokeOutcome, TokenPair,
};
