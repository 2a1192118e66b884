//! Outbound HTTP transport for provider key endpoints.

use std::time::Duration;

use freightline_shared::Environment;
use tracing::warn;

use super::error::VerificationError;

/// TLS certificate policy for provider requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// Certificates are validated.
    Verified,
    /// Certificates are not validated. Local and sandbox use only.
    InsecureDevelopmentOnly,
}

impl TransportSecurity {
    /// Resolves the policy for a deployment.
    ///
    /// The bypass requires an explicit opt-in, a non-production environment
    /// and a debug build. Any other combination yields `Verified`.
    #[must_use]
    pub fn resolve(environment: Environment, allow_insecure_tls: bool) -> Self {
        Self::resolve_for_build(environment, allow_insecure_tls, cfg!(debug_assertions))
    }

    fn resolve_for_build(
        environment: Environment,
        allow_insecure_tls: bool,
        debug_build: bool,
    ) -> Self {
        if !allow_insecure_tls {
            return Self::Verified;
        }
        if environment.is_production() || !debug_build {
            warn!(
                environment = %environment,
                debug_build,
                "Refusing to disable TLS certificate validation"
            );
            return Self::Verified;
        }

        warn!(
            environment = %environment,
            "TLS certificate validation DISABLED for identity provider requests"
        );
        Self::InsecureDevelopmentOnly
    }
}

/// Builds the HTTP client used for key-set requests.
///
/// # Errors
///
/// Returns `VerificationError::Transport` if the TLS backend fails to initialize.
pub fn build_http_client(
    timeout: Duration,
    security: TransportSecurity,
) -> Result<reqwest::Client, VerificationError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("freightline/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(security == TransportSecurity::InsecureDevelopmentOnly)
        .build()
        .map_err(|e| VerificationError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Environment::Development, false, true, TransportSecurity::Verified)]
    #[case(Environment::Development, true, true, TransportSecurity::InsecureDevelopmentOnly)]
    #[case(Environment::Staging, true, true, TransportSecurity::InsecureDevelopmentOnly)]
    #[case(Environment::Production, true, true, TransportSecurity::Verified)]
    #[case(Environment::Development, true, false, TransportSecurity::Verified)]
    #[case(Environment::Production, false, false, TransportSecurity::Verified)]
    fn test_resolve(
        #[case] environment: Environment,
        #[case] allow: bool,
        #[case] debug_build: bool,
        #[case] expected: TransportSecurity,
    ) {
        assert_eq!(
            TransportSecurity::resolve_for_build(environment, allow, debug_build),
            expected
        );
    }

    #[test]
    fn test_production_never_insecure() {
        assert_eq!(
            TransportSecurity::resolve(Environment::Production, true),
            TransportSecurity::Verified
        );
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5), TransportSecurity::Verified).is_ok());
        assert!(
            build_http_client(
                Duration::from_secs(5),
                TransportSecurity::InsecureDevelopmentOnly
            )
            .is_ok()
        );
    }
}
