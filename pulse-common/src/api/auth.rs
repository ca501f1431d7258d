//! Admin identity verification
//!
//! Admin routes carry `Authorization: Bearer <token>`. The token is compared
//! against the configured admin token by SHA-256 digest so the comparison
//! does not short-circuit on the first differing byte of the secret itself.
//!
//! # Pure Functions
//!
//! No HTTP framework dependencies here; the engine's middleware maps
//! [`AdminAuthError`] onto 401/403 responses.

use sha2::{Digest, Sha256};

/// Admin authentication failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAuthError {
    /// No credentials presented (401)
    MissingCredentials,

    /// Authorization header present but not a bearer token (401)
    MalformedCredentials,

    /// Credentials presented but they are not the admin's (403)
    NotAdmin,

    /// Service has no admin token configured; admin routes are closed (403)
    AdminDisabled,
}

impl std::fmt::Display for AdminAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminAuthError::MissingCredentials => write!(f, "Missing admin credentials"),
            AdminAuthError::MalformedCredentials => {
                write!(f, "Authorization header must be 'Bearer <token>'")
            }
            AdminAuthError::NotAdmin => write!(f, "Caller is not the admin identity"),
            AdminAuthError::AdminDisabled => write!(f, "Admin routes are disabled"),
        }
    }
}

impl std::error::Error for AdminAuthError {}

impl AdminAuthError {
    /// True when the caller never identified itself (401 rather than 403)
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AdminAuthError::MissingCredentials | AdminAuthError::MalformedCredentials
        )
    }
}

/// Extract the token from an `Authorization` header value
///
/// # Examples
///
/// ```
/// use pulse_common::api::auth::parse_bearer;
///
/// assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
/// assert_eq!(parse_bearer("bearer abc"), Some("abc"));
/// assert_eq!(parse_bearer("Basic abc"), None);
/// ```
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Verify an `Authorization` header against the configured admin token
///
/// # Examples
///
/// ```
/// use pulse_common::api::auth::{verify_admin_token, AdminAuthError};
///
/// assert!(verify_admin_token(Some("Bearer s3cret"), Some("s3cret")).is_ok());
/// assert_eq!(
///     verify_admin_token(None, Some("s3cret")),
///     Err(AdminAuthError::MissingCredentials)
/// );
/// ```
pub fn verify_admin_token(
    authorization: Option<&str>,
    admin_token: Option<&str>,
) -> Result<(), AdminAuthError> {
    let expected = match admin_token {
        Some(token) if !token.trim().is_empty() => token,
        _ => return Err(AdminAuthError::AdminDisabled),
    };

    let header = authorization.ok_or(AdminAuthError::MissingCredentials)?;
    let provided = parse_bearer(header).ok_or(AdminAuthError::MalformedCredentials)?;

    let matches = digest(provided)
        .iter()
        .zip(digest(expected).iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0;

    if matches {
        Ok(())
    } else {
        Err(AdminAuthError::NotAdmin)
    }
}
