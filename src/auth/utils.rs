//! Small helpers for email handling and opaque code generation.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;

/// Trim and lowercase an address; every lookup key goes through this first.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check for an address that went through [`normalize_email`].
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Create a new opaque code for confirmation and recovery links.
///
/// The raw value is only sent to the user; the directory stores it verbatim
/// and it is never derivable from anything else.
pub(crate) fn generate_code() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate code")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Bob@Example.COM "), "bob@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("bob@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn generate_code_is_32_random_bytes() {
        let decoded_len = generate_code()
            .ok()
            .and_then(|code| Base64UrlUnpadded::decode_vec(&code).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generate_code_does_not_repeat() {
        let first = generate_code().expect("code");
        let second = generate_code().expect("code");
        assert_ne!(first, second);
    }
}
