//! Padron client configuration.
//!
//! Selects the tax-authority environment (homologation vs. production), the
//! lookup provider, credentials for the signing step, and the tuning knobs
//! for timeouts, caching and retry. Defaults target homologation. Override
//! via environment variables or explicit construction for tests.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use padron_core::{Cuit, ValidationError};
use url::Url;
use zeroize::Zeroizing;

use crate::retry::RetryPolicy;
use crate::signer::SigningCredentials;

/// Tax-authority environment. Selects the base URLs of both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Testing environment (`wsaahomo` / `awshomo`).
    Homologation,
    /// Production environment.
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Homologation => "homologation",
            Self::Production => "production",
        }
    }

    /// Default WSAA `LoginCms` endpoint for this environment.
    pub fn wsaa_url(&self) -> &'static str {
        match self {
            Self::Homologation => "https://wsaahomo.afip.gov.ar/ws/services/LoginCms",
            Self::Production => "https://wsaa.afip.gov.ar/ws/services/LoginCms",
        }
    }

    /// Default Padron A5 endpoint for this environment.
    pub fn registry_url(&self) -> &'static str {
        match self {
            Self::Homologation => {
                "https://awshomo.afip.gov.ar/sr-padron/webservices/personaServiceA5"
            }
            Self::Production => "https://aws.afip.gov.ar/sr-padron/webservices/personaServiceA5",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "homologation" | "homo" | "testing" | "test" => Ok(Self::Homologation),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue {
                var: "PADRON_ENV".into(),
                value: other.into(),
            }),
        }
    }
}

/// Which lookup strategy backs the enrichment orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// WSAA ticket + Padron SOAP lookup.
    Direct,
    /// Third-party REST proxy authenticated with an API key.
    Delegated,
    /// Canned records, for offline environments and tests.
    Fixture,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "afip" | "padron" => Ok(Self::Direct),
            "delegated" | "api" => Ok(Self::Delegated),
            "fixture" | "mock" => Ok(Self::Fixture),
            other => Err(ConfigError::InvalidValue {
                var: "PADRON_PROVIDER".into(),
                value: other.into(),
            }),
        }
    }
}

/// Configuration for the Padron lookup stack.
///
/// Custom `Debug` implementation redacts the delegated API key.
#[derive(Clone)]
pub struct PadronConfig {
    /// Tax-authority environment.
    pub environment: Environment,
    /// Lookup provider backing the orchestrator.
    pub provider: Provider,
    /// WSAA `LoginCms` endpoint.
    pub wsaa_url: Url,
    /// Padron `getPersona` endpoint.
    pub registry_url: Url,
    /// WSAA service identifier the ticket is requested for.
    pub service: String,
    /// X.509 certificate (PEM) used to sign the login request.
    pub cert_path: Option<PathBuf>,
    /// Private key (PEM) matching `cert_path`.
    pub key_path: Option<PathBuf>,
    /// CUIT on whose behalf registry queries are made.
    pub represented_cuit: Option<Cuit>,
    /// `openssl` binary used by the CMS signer.
    pub openssl_bin: PathBuf,
    /// Base URL of the delegated REST proxy.
    pub delegated_url: Option<Url>,
    /// API key for the delegated REST proxy.
    pub delegated_api_key: Option<Zeroizing<String>>,
    /// Optional JSON file with fixture records.
    pub fixtures_path: Option<PathBuf>,
    /// Timeout for every remote call, in seconds.
    pub timeout_secs: u64,
    /// TTL of cached enrichment results, in seconds.
    pub result_ttl_secs: u64,
    /// Safety margin subtracted from the ticket expiration, in seconds.
    pub ticket_margin_secs: u64,
    /// Minimum TTL for a cached ticket, in seconds.
    pub ticket_floor_secs: u64,
    /// Retry policy for lookup attempts.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for PadronConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PadronConfig")
            .field("environment", &self.environment)
            .field("provider", &self.provider)
            .field("wsaa_url", &self.wsaa_url)
            .field("registry_url", &self.registry_url)
            .field("service", &self.service)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("represented_cuit", &self.represented_cuit)
            .field("openssl_bin", &self.openssl_bin)
            .field("delegated_url", &self.delegated_url)
            .field(
                "delegated_api_key",
                &self.delegated_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fixtures_path", &self.fixtures_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("result_ttl_secs", &self.result_ttl_secs)
            .field("ticket_margin_secs", &self.ticket_margin_secs)
            .field("ticket_floor_secs", &self.ticket_floor_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Default WSAA service for the A5 registry.
pub const DEFAULT_SERVICE: &str = "ws_sr_padron_a5";

impl PadronConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PADRON_ENV` (default: `homologation`)
    /// - `PADRON_PROVIDER` (default: `direct`)
    /// - `PADRON_WSAA_URL`, `PADRON_REGISTRY_URL` (default: per environment)
    /// - `PADRON_SERVICE` (default: `ws_sr_padron_a5`)
    /// - `PADRON_CERT_PATH`, `PADRON_KEY_PATH`, `PADRON_REPRESENTED_CUIT` (required for `direct`)
    /// - `PADRON_OPENSSL_BIN` (default: `openssl`)
    /// - `PADRON_DELEGATED_URL`, `PADRON_DELEGATED_API_KEY` (required for `delegated`)
    /// - `PADRON_FIXTURES_PATH`
    /// - `PADRON_TIMEOUT_SECS` (default: 5)
    /// - `PADRON_RESULT_TTL_SECS` (default: 3600)
    /// - `PADRON_TICKET_MARGIN_SECS` / `PADRON_TICKET_FLOOR_SECS` (default: 60 / 30)
    /// - `PADRON_RETRY_ATTEMPTS` / `PADRON_RETRY_BASE_MS` / `PADRON_RETRY_JITTER_MS` (default: 3 / 250 / 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("PADRON_ENV") {
            Some(v) => v.parse()?,
            None => Environment::Homologation,
        };
        let provider = match lookup("PADRON_PROVIDER") {
            Some(v) => v.parse()?,
            None => Provider::Direct,
        };

        let url_var = |var: &str, default: &str| -> Result<Url, ConfigError> {
            let raw = lookup(var).unwrap_or_else(|| default.to_string());
            Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
        };
        let number = |var: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    var: var.to_string(),
                    value: raw,
                }),
                None => Ok(default),
            }
        };

        let represented_cuit = lookup("PADRON_REPRESENTED_CUIT")
            .map(|raw| {
                Cuit::new(&raw).map_err(|e| ConfigError::InvalidCuit("PADRON_REPRESENTED_CUIT", e))
            })
            .transpose()?;
        let delegated_url = lookup("PADRON_DELEGATED_URL")
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|e| ConfigError::InvalidUrl("PADRON_DELEGATED_URL".into(), e.to_string()))
            })
            .transpose()?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: number("PADRON_RETRY_ATTEMPTS", u64::from(defaults.max_attempts))?
                .clamp(1, 10) as u32,
            base_delay: Duration::from_millis(number(
                "PADRON_RETRY_BASE_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            max_jitter: Duration::from_millis(number(
                "PADRON_RETRY_JITTER_MS",
                defaults.max_jitter.as_millis() as u64,
            )?),
        };

        let config = Self {
            environment,
            provider,
            wsaa_url: url_var("PADRON_WSAA_URL", environment.wsaa_url())?,
            registry_url: url_var("PADRON_REGISTRY_URL", environment.registry_url())?,
            service: lookup("PADRON_SERVICE").unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            cert_path: lookup("PADRON_CERT_PATH").map(PathBuf::from),
            key_path: lookup("PADRON_KEY_PATH").map(PathBuf::from),
            represented_cuit,
            openssl_bin: lookup("PADRON_OPENSSL_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("openssl")),
            delegated_url,
            delegated_api_key: lookup("PADRON_DELEGATED_API_KEY").map(Zeroizing::new),
            fixtures_path: lookup("PADRON_FIXTURES_PATH").map(PathBuf::from),
            timeout_secs: number("PADRON_TIMEOUT_SECS", 5)?,
            result_ttl_secs: number("PADRON_RESULT_TTL_SECS", 3600)?,
            ticket_margin_secs: number("PADRON_TICKET_MARGIN_SECS", 60)?,
            ticket_floor_secs: number("PADRON_TICKET_FLOOR_SECS", 30)?,
            retry,
        };
        config.check_provider_requirements()?;
        Ok(config)
    }

    /// Create a configuration pointing every endpoint at a local mock server.
    ///
    /// WSAA lives under `/ws/services/LoginCms`, the registry under
    /// `/sr-padron/webservices/personaServiceA5` and the delegated proxy
    /// under `/api`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base` cannot be parsed.
    pub fn local_mock(base: &str, provider: Provider) -> Result<Self, ConfigError> {
        let base = base.trim_end_matches('/');
        let make_url = |path: &str| -> Result<Url, ConfigError> {
            Url::parse(&format!("{base}{path}"))
                .map_err(|e| ConfigError::InvalidUrl(base.to_string(), e.to_string()))
        };
        Ok(Self {
            environment: Environment::Homologation,
            provider,
            wsaa_url: make_url("/ws/services/LoginCms")?,
            registry_url: make_url("/sr-padron/webservices/personaServiceA5")?,
            service: DEFAULT_SERVICE.to_string(),
            cert_path: Some(PathBuf::from("test-cert.pem")),
            key_path: Some(PathBuf::from("test-key.pem")),
            represented_cuit: Cuit::new("30712345671").ok(),
            openssl_bin: PathBuf::from("openssl"),
            delegated_url: Some(make_url("/api")?),
            delegated_api_key: Some(Zeroizing::new("test-api-key".into())),
            fixtures_path: None,
            timeout_secs: 2,
            result_ttl_secs: 3600,
            ticket_margin_secs: 60,
            ticket_floor_secs: 30,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_jitter: Duration::ZERO,
            },
        })
    }

    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Shared HTTP client for the SOAP endpoints, with the per-call timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }

    /// Certificate and key for the signer, if both are configured.
    pub fn signing_credentials(&self) -> Result<SigningCredentials, ConfigError> {
        Ok(SigningCredentials {
            cert_path: self
                .cert_path
                .clone()
                .ok_or(ConfigError::Missing("PADRON_CERT_PATH"))?,
            key_path: self
                .key_path
                .clone()
                .ok_or(ConfigError::Missing("PADRON_KEY_PATH"))?,
        })
    }

    fn check_provider_requirements(&self) -> Result<(), ConfigError> {
        match self.provider {
            Provider::Direct => {
                if self.cert_path.is_none() {
                    return Err(ConfigError::Missing("PADRON_CERT_PATH"));
                }
                if self.key_path.is_none() {
                    return Err(ConfigError::Missing("PADRON_KEY_PATH"));
                }
                if self.represented_cuit.is_none() {
                    return Err(ConfigError::Missing("PADRON_REPRESENTED_CUIT"));
                }
            }
            Provider::Delegated => {
                if self.delegated_url.is_none() {
                    return Err(ConfigError::Missing("PADRON_DELEGATED_URL"));
                }
                if self.delegated_api_key.is_none() {
                    return Err(ConfigError::Missing("PADRON_DELEGATED_API_KEY"));
                }
            }
            Provider::Fixture => {}
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required for the selected provider")]
    Missing(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("invalid CUIT in {0}: {1}")]
    InvalidCuit(&'static str, ValidationError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("cannot load fixtures from {path}: {reason}")]
    Fixtures { path: String, reason: String },
}
