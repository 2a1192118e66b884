//! Identity verification error types.

use freightline_shared::AppError;
use thiserror::Error;

/// Identity token verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Token is not three base64url segments with JSON header and payload.
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    /// Token header carries no `kid`.
    #[error("identity token header has no key ID")]
    MissingKeyId,

    /// The `kid` is not in the provider's current key set.
    #[error("Invalid JWT Signature or missing key ID.")]
    UnknownKey {
        /// Key identifier named by the token.
        kid: String,
    },

    /// One or more constraints failed.
    #[error(
        "The token violates some mandatory constraints, following violations occurred:\n- {}",
        .violations.join("\n- ")
    )]
    TokenValidation {
        /// Every violated constraint, in check order.
        violations: Vec<String>,
    },

    /// Signing keys could not be fetched or parsed.
    #[error("failed to fetch signing keys from {url}: {reason}")]
    KeySetFetch {
        /// Keys endpoint.
        url: String,
        /// Failure detail.
        reason: String,
    },

    /// The provider reported the token as not valid.
    #[error("identity provider rejected the token")]
    Rejected,

    /// HTTP client could not be built.
    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}

impl VerificationError {
    /// Create a malformed token error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken(reason.into())
    }

    /// Create a key set fetch error.
    #[must_use]
    pub fn key_set_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeySetFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns a stable machine-readable code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "MALFORMED_TOKEN",
            Self::MissingKeyId => "MISSING_KEY_ID",
            Self::UnknownKey { .. } => "UNKNOWN_KEY",
            Self::TokenValidation { .. } => "TOKEN_VALIDATION_FAILED",
            Self::KeySetFetch { .. } => "KEY_SET_FETCH_FAILED",
            Self::Rejected => "TOKEN_REJECTED",
            Self::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Returns true when the token itself is at fault, as opposed to the
    /// verifier's infrastructure.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        !matches!(self, Self::KeySetFetch { .. } | Self::Transport(_))
    }
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::KeySetFetch { .. } => Self::ExternalService(err.to_string()),
            VerificationError::Transport(_) => Self::Internal(err.to_string()),
            _ => Self::Unauthorized(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_message() {
        let err = VerificationError::UnknownKey {
            kid: "missing".into(),
        };
        assert_eq!(err.to_string(), "Invalid JWT Signature or missing key ID.");
    }

    #[test]
    fn test_token_validation_lists_every_violation() {
        let err = VerificationError::TokenValidation {
            violations: vec![
                "Token signature mismatch".into(),
                "The token is expired".into(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "The token violates some mandatory constraints, following violations occurred:\n\
             - Token signature mismatch\n\
             - The token is expired"
        );
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = VerificationError::MissingKeyId.into();
        assert_eq!(app.status_code(), 401);

        let app: AppError = VerificationError::UnknownKey { kid: "k".into() }.into();
        assert_eq!(app.error_code(), "UNAUTHORIZED");

        let app: AppError =
            VerificationError::key_set_fetch("https://keys.example", "status 500").into();
        assert_eq!(app.error_code(), "EXTERNAL_SERVICE_ERROR");

        let app: AppError = VerificationError::Transport("tls".into()).into();
        assert_eq!(app.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_is_token_error() {
        assert!(VerificationError::malformed("x").is_token_error());
        assert!(VerificationError::Rejected.is_token_error());
        assert!(!VerificationError::key_set_fetch("u", "r").is_token_error());
    }
}
