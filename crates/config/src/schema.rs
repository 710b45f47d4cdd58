use gatesync_types::{ClientAccessDto, KeySourceType, PublicKeySource, SyncError};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_registry_url() -> String {
    "http://localhost:8500".to_string()
}
fn default_registry_timeout() -> u64 {
    10
}

/// Connection settings for the external configuration registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry service.
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            timeout_secs: default_registry_timeout(),
        }
    }
}

fn default_events_url() -> String {
    "http://localhost:8500/events".to_string()
}
fn default_channel() -> String {
    "gateway-config".to_string()
}

/// Message-bus subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// SSE endpoint publishing change notifications.
    #[serde(default = "default_events_url")]
    pub events_url: String,
    /// Logical channel name, reported on the health surface.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Disabling the bus entirely forces polling mode.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Abort startup when the bus is unreachable instead of falling back to
    /// polling.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            events_url: default_events_url(),
            channel: default_channel(),
            enabled: true,
            fail_fast: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_attempt_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    30
}

/// Retry and polling-fallback settings for the refresh coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Maximum reload attempts per notification before giving up and keeping
    /// the previous snapshot.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Double the delay after each failed attempt instead of keeping it
    /// fixed.
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Full-reload interval in polling-fallback mode, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: true,
            attempt_timeout_secs: default_attempt_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_key_refresh_interval() -> u64 {
    300
}

/// One configured public-key source.
///
/// The credential string stays in the config shape only long enough to be
/// wrapped in a [`SecretString`] by [`KeySourceConfig::to_source`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySourceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: KeySourceType,
    pub url: String,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default = "default_key_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub use_provider_prefixed_key: bool,
}

impl KeySourceConfig {
    /// Converts the config entry into the runtime source descriptor.
    #[must_use]
    pub fn to_source(&self) -> PublicKeySource {
        PublicKeySource {
            id: self.id.clone(),
            source_type: self.source_type,
            url: self.url.clone(),
            auth_type: self.auth_type.clone(),
            credentials: self.credentials.clone().map(SecretString::from),
            refresh_interval_secs: self.refresh_interval_secs,
            issuer: self.issuer.clone(),
            is_default: self.is_default,
            use_provider_prefixed_key: self.use_provider_prefixed_key,
        }
    }
}

/// The shape of an external override file: a single `overrides` list of the
/// same DTO entries the registry serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideFile {
    #[serde(default)]
    pub overrides: Vec<ClientAccessDto>,
}

/// Top-level gatesync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub key_sources: Vec<KeySourceConfig>,
    /// Inline client access overrides, applied on top of every registry
    /// reload.
    #[serde(default)]
    pub access_overrides: Vec<ClientAccessDto>,
    /// Optional external override file, watched for changes at runtime.
    #[serde(default)]
    pub override_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            bus: BusConfig::default(),
            refresh: RefreshConfig::default(),
            key_sources: Vec::new(),
            access_overrides: Vec::new(),
            override_file: None,
        }
    }
}

impl GatewayConfig {
    /// Parses configuration from a YAML string, merged with defaults and
    /// `GATESYNC_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction
    /// fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(GatewayConfig::default()))
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed("GATESYNC_").split("__"))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults and
    /// `GATESYNC_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(GatewayConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("GATESYNC_").split("__"))
            .extract()
    }

    /// Semantic checks that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for duplicate or empty key-source ids,
    /// empty URLs, more than one default source, or a zero refresh interval.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut seen = std::collections::HashSet::new();
        let mut defaults = 0usize;
        for source in &self.key_sources {
            if source.id.trim().is_empty() {
                return Err(SyncError::Config("key source id must not be empty".into()));
            }
            if source.url.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "key source '{}' has an empty url",
                    source.id
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(SyncError::Config(format!(
                    "duplicate key source id '{}'",
                    source.id
                )));
            }
            if source.refresh_interval_secs == 0 {
                return Err(SyncError::Config(format!(
                    "key source '{}' has a zero refresh interval",
                    source.id
                )));
            }
            if source.is_default {
                defaults += 1;
            }
        }
        if defaults > 1 {
            return Err(SyncError::Config(
                "at most one key source may be marked default".into(),
            ));
        }
        if self.refresh.max_attempts == 0 {
            return Err(SyncError::Config("refresh.max_attempts must be >= 1".into()));
        }
        if self.refresh.poll_interval_secs == 0 {
            return Err(SyncError::Config(
                "refresh.poll_interval_secs must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
registry:
  base_url: "http://registry.internal:8500"
  timeout_secs: 5
bus:
  events_url: "http://registry.internal:8500/events"
  channel: "gw-config"
  fail_fast: true
refresh:
  max_attempts: 5
  poll_interval_secs: 15
key_sources:
  - id: primary-idp
    type: jwks
    url: "https://idp.example.com/.well-known/jwks.json"
    issuer: "https://idp.example.com"
    is_default: true
  - id: partner-pem
    type: pem
    url: "https://partner.example.com/public.pem"
    auth_type: bearer
    credentials: "s3cret"
    refresh_interval_secs: 60
    use_provider_prefixed_key: true
access_overrides:
  - clientId: local-tool
    active: true
    allow: ["*:*"]
"#;

    #[test]
    fn test_default_config() {
        let c = GatewayConfig::default();
        assert_eq!(c.registry.base_url, "http://localhost:8500");
        assert_eq!(c.refresh.max_attempts, 3);
        assert!(c.bus.enabled);
        assert!(!c.bus.fail_fast);
        assert!(c.key_sources.is_empty());
    }

    #[test]
    fn test_from_yaml_registry_and_bus() {
        let c = GatewayConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.registry.base_url, "http://registry.internal:8500");
        assert_eq!(c.registry.timeout_secs, 5);
        assert_eq!(c.bus.channel, "gw-config");
        assert!(c.bus.fail_fast);
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = GatewayConfig::from_yaml("refresh:\n  max_attempts: 7\n").unwrap();
        assert_eq!(c.refresh.max_attempts, 7);
        assert_eq!(c.refresh.poll_interval_secs, 30); // default preserved
        assert!(c.refresh.exponential_backoff);
    }

    #[test]
    fn test_from_yaml_key_sources() {
        let c = GatewayConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.key_sources.len(), 2);
        let jwks = &c.key_sources[0];
        assert_eq!(jwks.source_type, KeySourceType::Jwks);
        assert!(jwks.is_default);
        assert_eq!(jwks.refresh_interval_secs, 300); // default
        let pem = &c.key_sources[1];
        assert_eq!(pem.refresh_interval_secs, 60);
        assert!(pem.use_provider_prefixed_key);
    }

    #[test]
    fn test_from_yaml_overrides() {
        let c = GatewayConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.access_overrides.len(), 1);
        assert_eq!(c.access_overrides[0].client_id, "local-tool");
        assert_eq!(c.access_overrides[0].allow, vec!["*:*"]);
    }

    #[test]
    fn test_to_source_wraps_credentials() {
        let c = GatewayConfig::from_yaml(SAMPLE_YAML).unwrap();
        let source = c.key_sources[1].to_source();
        assert_eq!(source.id, "partner-pem");
        assert!(source.credentials.is_some());
        assert_eq!(source.auth_type.as_deref(), Some("bearer"));
        // Debug output must not leak the credential.
        assert!(!format!("{source:?}").contains("s3cret"));
    }

    #[test]
    fn test_validate_ok() {
        let c = GatewayConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_source_id() {
        let yaml = r#"
key_sources:
  - { id: a, type: pem, url: "https://x/pem" }
  - { id: a, type: jwks, url: "https://y/jwks" }
"#;
        let c = GatewayConfig::from_yaml(yaml).unwrap();
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_two_defaults_rejected() {
        let yaml = r#"
key_sources:
  - { id: a, type: pem, url: "https://x/pem", is_default: true }
  - { id: b, type: jwks, url: "https://y/jwks", is_default: true }
"#;
        let c = GatewayConfig::from_yaml(yaml).unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_zero_attempts_rejected() {
        let c = GatewayConfig::from_yaml("refresh:\n  max_attempts: 0\n").unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_override_file_shape() {
        let yaml = r#"
overrides:
  - clientId: acme
    active: true
    allow: ["payment-service:*"]
"#;
        use figment::providers::Format as _;
        let parsed: OverrideFile = figment::Figment::new()
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap();
        assert_eq!(parsed.overrides.len(), 1);
        assert_eq!(parsed.overrides[0].client_id, "acme");
    }
}
