//! Relying party configuration.
//!
//! Configuration is grouped into subsections for caching, HTTP transport and
//! the relying party's own entity statement. All durations accept
//! human-readable values (`"5m"`, `"1h"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root relying party configuration.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://fachdienst.example.com"
/// federation_master = "https://app-test.federationmaster.de"
/// redirect_uris = ["https://fachdienst.example.com/auth/callback"]
/// scopes = ["openid", "urn:telematik:email", "urn:telematik:versicherter"]
///
/// [cache]
/// minimum_lookahead = "5m"
///
/// [http]
/// request_timeout = "10s"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelyingPartyConfig {
    /// Our own entity identifier, used as `iss`/`sub` of our entity
    /// statement and as `client_id` towards identity providers.
    pub issuer: String,

    /// Entity identifier of the federation master (trust anchor).
    pub federation_master: String,

    /// Organization name published in our relying party metadata.
    pub organization_name: String,

    /// Registered redirect URIs. The first one is the default callback.
    pub redirect_uris: Vec<String>,

    /// Scopes requested from identity providers.
    pub scopes: Vec<String>,

    /// Federation document cache configuration.
    pub cache: CacheConfig,

    /// HTTP transport configuration.
    pub http: HttpConfig,

    /// Configuration of our own entity statement.
    pub entity_statement: EntityStatementConfig,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:1234".to_string(),
            federation_master: "https://app-test.federationmaster.de".to_string(),
            organization_name: String::new(),
            redirect_uris: vec!["http://localhost:1234/auth/callback".to_string()],
            scopes: vec![
                "openid".to_string(),
                "urn:telematik:email".to_string(),
                "urn:telematik:versicherter".to_string(),
                "urn:telematik:display_name".to_string(),
            ],
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            entity_statement: EntityStatementConfig::default(),
        }
    }
}

/// Federation document cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cached documents are refreshed once they would expire within this window.
    #[serde(with = "humantime_serde")]
    pub minimum_lookahead: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            minimum_lookahead: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Whether to allow plain HTTP URLs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            allow_http: false,
        }
    }
}

/// Configuration of our own entity statement.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EntityStatementConfig {
    /// Validity of each freshly signed entity statement.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for EntityStatementConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl RelyingPartyConfig {
    /// Parses and validates a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and any error
    /// reported by [`RelyingPartyConfig::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer or federation master is not an absolute URL
    /// - A redirect URI is not an absolute URL
    /// - The scopes do not include `openid`
    /// - The entity statement TTL is zero
    ///
    /// Returns `ConfigError::Missing` if no redirect URI is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.issuer_url()?;
        self.federation_master_url()?;

        if self.redirect_uris.is_empty() {
            return Err(ConfigError::Missing("redirect_uris".to_string()));
        }
        for uri in &self.redirect_uris {
            parse_url("redirect_uris", uri)?;
        }

        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::InvalidValue(
                "scopes must include 'openid'".to_string(),
            ));
        }

        if self.entity_statement.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "entity_statement.ttl must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the issuer as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the issuer is not a URL.
    pub fn issuer_url(&self) -> Result<Url, ConfigError> {
        parse_url("issuer", &self.issuer)
    }

    /// Returns the federation master as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the value is not a URL.
    pub fn federation_master_url(&self) -> Result<Url, ConfigError> {
        parse_url("federation_master", &self.federation_master)
    }

    /// Returns the default callback URI (the first redirect URI).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no redirect URI is configured.
    pub fn callback_url(&self) -> Result<Url, ConfigError> {
        let first = self
            .redirect_uris
            .first()
            .ok_or_else(|| ConfigError::Missing("redirect_uris".to_string()))?;
        parse_url("redirect_uris", first)
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue(format!("{field} cannot be empty")));
    }
    Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(format!("{field} is not a valid URL: {e}")))
}
