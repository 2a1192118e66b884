//! Claim constraints checked after the signature.
//!
//! Each check returns the violation message instead of failing, so a
//! verifier can report every broken constraint at once.

use chrono::{DateTime, Utc};

use super::claims::VerifiedClaims;
use super::token::SignatureCheck;

/// Signature did not verify.
pub const SIGNATURE_MISMATCH: &str = "Token signature mismatch";
/// Algorithm or key unusable for this token.
pub const SIGNER_MISMATCH: &str = "Token signer mismatch";
/// `iss` did not match.
pub const ISSUER_MISMATCH: &str = "The token was not issued by the given issuers";
/// `exp` passed.
pub const EXPIRED: &str = "The token is expired";
/// `iat` in the future.
pub const ISSUED_IN_FUTURE: &str = "The token was issued in the future";
/// `nbf` in the future.
pub const NOT_YET_VALID: &str = "The token cannot be used yet";

/// Maps a signature check to its violation, if any.
#[must_use]
pub fn signature_violation(check: SignatureCheck) -> Option<&'static str> {
    match check {
        SignatureCheck::Valid => None,
        SignatureCheck::Mismatch => Some(SIGNATURE_MISMATCH),
        SignatureCheck::SignerMismatch => Some(SIGNER_MISMATCH),
    }
}

/// Checks `iss` against the accepted issuers.
#[must_use]
pub fn issuer_violation(claims: &VerifiedClaims, accepted: &[&str]) -> Option<&'static str> {
    match claims.issuer() {
        Some(iss) if accepted.contains(&iss) => None,
        _ => Some(ISSUER_MISMATCH),
    }
}

/// Loose validity window check.
///
/// Tolerates `leeway_secs` of clock skew in both directions. Absent `exp`,
/// `iat` and `nbf` claims are not violations.
#[must_use]
pub fn time_window_violations(
    claims: &VerifiedClaims,
    now: DateTime<Utc>,
    leeway_secs: u64,
) -> Vec<&'static str> {
    let now = now.timestamp();
    let leeway = i64::try_from(leeway_secs).unwrap_or(i64::MAX);
    let mut violations = Vec::new();

    if let Some(exp) = claims.expires_at()
        && now.saturating_sub(leeway) >= exp
    {
        violations.push(EXPIRED);
    }
    if let Some(iat) = claims.issued_at()
        && iat > now.saturating_add(leeway)
    {
        violations.push(ISSUED_IN_FUTURE);
    }
    if let Some(nbf) = claims.not_before()
        && nbf > now.saturating_add(leeway)
    {
        violations.push(NOT_YET_VALID);
    }

    violations
}
