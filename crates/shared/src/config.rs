//! Application configuration management.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Effective deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Third-party identity verification configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    #[serde(alias = "dev", alias = "local")]
    Development,
    /// Sandbox / staging.
    #[serde(alias = "sandbox")]
    Staging,
    /// Production.
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    /// Returns true for the production environment.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "staging" | "sandbox" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Identity verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Timeout for outbound key-set requests in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Sign in with Apple.
    #[serde(default)]
    pub apple: AppleConfig,
    /// Google Sign-In.
    #[serde(default)]
    pub google: GoogleConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            apple: AppleConfig::default(),
            google: GoogleConfig::default(),
        }
    }
}

fn default_http_timeout() -> u64 {
    10
}

/// Sign in with Apple configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleConfig {
    /// Published JWKS endpoint.
    #[serde(default = "default_apple_keys_url")]
    pub keys_url: String,
    /// Required `iss` claim.
    #[serde(default = "default_apple_issuer")]
    pub issuer: String,
    /// How long a fetched key set is trusted, in seconds.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,
    /// Clock skew tolerance in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
    /// Force one key-set refresh when a token names an unknown key.
    #[serde(default)]
    pub refresh_on_unknown_key: bool,
}

impl Default for AppleConfig {
    fn default() -> Self {
        Self {
            keys_url: default_apple_keys_url(),
            issuer: default_apple_issuer(),
            key_cache_ttl_secs: default_key_cache_ttl(),
            leeway_secs: default_leeway(),
            refresh_on_unknown_key: false,
        }
    }
}

fn default_apple_keys_url() -> String {
    "https://appleid.apple.com/auth/keys".to_string()
}

fn default_apple_issuer() -> String {
    "https://appleid.apple.com".to_string()
}

fn default_key_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_leeway() -> u64 {
    60
}

/// Google Sign-In configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// Published certificate (JWKS) endpoint.
    #[serde(default = "default_google_certs_url")]
    pub certs_url: String,
    /// Default OAuth client ID, used when a caller does not supply one.
    #[serde(default)]
    pub client_id: Option<String>,
    /// How long a fetched key set is trusted, in seconds.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,
    /// Clock skew tolerance in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
    /// Skip TLS certificate validation. Ignored in production and release builds.
    #[serde(default)]
    pub allow_insecure_tls: bool,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            certs_url: default_google_certs_url(),
            client_id: None,
            key_cache_ttl_secs: default_key_cache_ttl(),
            leeway_secs: default_leeway(),
            allow_insecure_tls: false,
        }
    }
}

fn default_google_certs_url() -> String {
    "https://www.googleapis.com/oauth2/v3/certs".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, lowest precedence first: `config/default`, `config/{RUN_MODE}`,
    /// then `FREIGHTLINE__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        // Run modes such as `test` only select a config file
        let environment = run_mode.parse::<Environment>().unwrap_or_default();

        let config = config::Config::builder()
            .set_default("environment", environment.as_str())?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("FREIGHTLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

