//! # Inkstream Auth
//!
//! `inkstream-auth` is the authentication and session lifecycle core of the
//! Inkstream blogging platform: credential verification, access/refresh token
//! issuance, refresh-token rotation bound to a device identity, email
//! confirmation and password-recovery code workflows, and the per-device
//! session store that backs logout and revocation.
//!
//! ## Sessions & rotation
//!
//! Every successful login mints a fresh `device_id` and one session row. The
//! refresh token is rotated in place on every use: the store holds exactly
//! one valid token per device, and a superseded token is rejected even though
//! its signature still verifies. Expired sessions are deleted lazily, on the
//! access that detects them.
//!
//! ## Trust domains
//!
//! Access and refresh tokens are signed with independent secrets. Access
//! tokens carry the user identity only; refresh tokens bind `{user_id,
//! device_id}` and are expected to travel as an `HttpOnly` cookie while the
//! access token rides in an `Authorization: Bearer` header.
//!
//! ## Collaborators
//!
//! The orchestrator is constructed with its collaborators injected: a
//! [`store::UserDirectory`], a [`store::SessionStore`], and an
//! [`email::NotificationGateway`]. In-memory and Postgres implementations
//! ship in [`store`]; log, recording, and SMTP mailers ship in [`email`].
//!
//! Authentication failures are typed outcomes, never raised errors: bad
//! credentials and invalid or superseded tokens collapse to `None`, while
//! registration and code flows report field-tagged rejections. Only store
//! and mailer failures propagate as errors.

pub mod auth;
pub mod email;
pub mod store;
