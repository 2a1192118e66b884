//! Third-party identity token verification.
//!
//! Sign in with Apple tokens are checked against Apple's published keys
//! (signature, issuer, skew-tolerant validity window). Google ID tokens are
//! checked for signature, issuer, audience and expiry. Both providers share a
//! TTL-bounded key set cache.

pub mod apple;
pub mod cache;
pub mod claims;
pub mod clock;
pub mod constraints;
pub mod error;
pub mod fetcher;
pub mod google;
pub mod keyset;
pub mod token;
pub mod transport;
pub mod verifier;

#[cfg(test)]
mod verification_props;

pub use apple::{APPLE_ISSUER, APPLE_KEYS_URL, AppleTokenVerifier};
pub use cache::{
    DEFAULT_KEY_SET_TTL, DEFAULT_MIN_REFRESH_INTERVAL, KeySetCache, KeyValueStore, MokaKeyStore,
};
pub use claims::VerifiedClaims;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::VerificationError;
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use google::{
    GOOGLE_CERTS_URL, GOOGLE_ISSUERS, GoogleCertsClient, GoogleClientVerifier,
    GoogleIdTokenClient, GoogleTokenVerifier,
};
pub use keyset::{CachedKeySet, SigningKeySet};
pub use token::IdentityToken;
pub use transport::{TransportSecurity, build_http_client};
pub use verifier::{IdentityProvider, IdentityVerifier, IdentityVerifiers, VerificationResult};
