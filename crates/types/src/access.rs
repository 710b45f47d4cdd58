//! Access-control data model: rules, per-client configs, and decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::now_unix;

/// Whether a matching rule grants or refuses access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleEffect {
    Allow,
    Deny,
}

/// A single parsed access rule.
///
/// Rules are compiled once from the `"<service>:<route>"` DSL (a leading `!`
/// marks [`RuleEffect::Deny`]) and never mutated afterwards. `raw` retains the
/// original rule text for logging and audit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub service_pattern: String,
    pub route_pattern: String,
    pub effect: RuleEffect,
    pub raw: String,
}

impl AccessRule {
    /// Returns `true` if this rule is a deny rule.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.effect == RuleEffect::Deny
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Where a cached client config came from, for audit and precedence logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigSource {
    Registry,
    YamlOverride,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "REGISTRY"),
            Self::YamlOverride => write!(f, "YAML_OVERRIDE"),
        }
    }
}

/// The cached access configuration for a single client.
///
/// Instances are built by a full reload or an override merge and are replaced
/// wholesale in the cache; no field is ever mutated in place. An empty rule
/// list means deny-by-default for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAccessConfig {
    pub client_id: String,
    pub tenant: Option<String>,
    pub active: bool,
    pub rules: Vec<AccessRule>,
    /// Unix seconds at which this config was built.
    pub last_updated: u64,
    pub source: ConfigSource,
}

impl ClientAccessConfig {
    /// Creates a config stamped with the current time.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        tenant: Option<String>,
        active: bool,
        rules: Vec<AccessRule>,
        source: ConfigSource,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            tenant,
            active,
            rules,
            last_updated: now_unix(),
            source,
        }
    }
}

/// The wire shape of a client access entry, shared by the registry endpoint
/// and the local YAML override list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAccessDto {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub active: bool,
    /// Raw rule strings in the `"<service>:<route>"` DSL.
    #[serde(default)]
    pub allow: Vec<String>,
}

/// Why a request was denied.
///
/// A denial is a normal, expected decision surfaced to the caller; it is
/// never represented as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The client id is not present in the cache.
    UnknownClient,
    /// The client exists but its config is marked inactive.
    InactiveClient,
    /// An explicit deny rule matched the request.
    DeniedByRule,
    /// No allow rule matched (deny-by-default).
    NoMatchingRule,
}

impl DenyReason {
    /// Stable short code used as a metrics tag value.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownClient => "unknown_client",
            Self::InactiveClient => "inactive_client",
            Self::DeniedByRule => "denied_by_rule",
            Self::NoMatchingRule => "no_matching_rule",
        }
    }

    /// Human-readable denial reason for logs and responses.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownClient => "unknown client",
            Self::InactiveClient => "inactive client",
            Self::DeniedByRule => "denied by rule",
            Self::NoMatchingRule => "no matching allow rule",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// The outcome of evaluating a request against a client's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

impl AccessDecision {
    /// Returns `true` if the request was allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}
