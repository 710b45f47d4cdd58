//! The access-control engine: cached per-client configs and decision
//! evaluation.

use crate::{matcher::wildcard_match, metrics, parser::parse_rules};
use gatesync_cache::ConfigCache;
use gatesync_types::{
    AccessDecision, ClientAccessConfig, ClientAccessDto, ConfigSource, DenyReason,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Evaluates allow/deny decisions against a snapshot cache of per-client
/// configurations.
///
/// The registry population forms the base; each YAML override replaces the
/// whole entry (active flag and rule list) for its client id, and override
/// entries for clients absent from the registry still produce usable
/// configs. Both inputs are retained so either side can be reloaded
/// independently — a registry reload re-applies the current overrides, and
/// an override change re-merges against the current base.
pub struct AccessControlEngine {
    cache: ConfigCache<String, ClientAccessConfig>,
    /// Last successfully fetched registry population.
    base: Mutex<Vec<ClientAccessDto>>,
    /// Current YAML override entries.
    overrides: Mutex<Vec<ClientAccessDto>>,
}

impl AccessControlEngine {
    /// Creates an engine with an empty cache (every client unknown).
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: ConfigCache::new(),
            base: Mutex::new(Vec::new()),
            overrides: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the registry base population and republishes the merged
    /// snapshot. Returns the number of cached configs.
    pub fn load_registry(&self, configs: Vec<ClientAccessDto>) -> usize {
        *self.base.lock().expect("base lock") = configs;
        self.rebuild()
    }

    /// Replaces the override entries and republishes the merged snapshot.
    /// Returns the number of cached configs.
    pub fn set_overrides(&self, overrides: Vec<ClientAccessDto>) -> usize {
        *self.overrides.lock().expect("overrides lock") = overrides;
        self.rebuild()
    }

    /// Number of client configs in the current snapshot.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.cache.len()
    }

    /// Rebuilds and atomically publishes the merged snapshot from the
    /// retained base and overrides.
    fn rebuild(&self) -> usize {
        let started = Instant::now();
        let base = self.base.lock().expect("base lock").clone();
        let overrides = self.overrides.lock().expect("overrides lock").clone();

        let mut merged: HashMap<String, ClientAccessConfig> = HashMap::with_capacity(base.len());
        for dto in &base {
            merged.insert(
                dto.client_id.clone(),
                build_config(dto, ConfigSource::Registry),
            );
        }
        // Overrides replace the whole entry; a duplicate client id in the
        // override list resolves last-one-wins by iteration order.
        for dto in &overrides {
            if merged
                .insert(
                    dto.client_id.clone(),
                    build_config(dto, ConfigSource::YamlOverride),
                )
                .is_some()
            {
                tracing::debug!(client = dto.client_id.as_str(), "override replaced existing config");
            }
        }

        let count = merged.len();
        self.cache.replace(merged);
        metrics::record_config_count(count);
        metrics::record_refresh_duration(started.elapsed());
        tracing::info!(configs = count, "access config snapshot published");
        count
    }

    /// Evaluates a request. Never fails: every outcome is a decision.
    ///
    /// Precedence is fixed: unknown client, inactive client, any matching
    /// deny rule, first matching allow rule, then deny-by-default.
    #[must_use]
    pub fn check(&self, service: &str, route: &str, client_id: &str) -> AccessDecision {
        let started = Instant::now();
        metrics::record_checked(client_id, service, route);

        let decision = self.evaluate(service, route, client_id);

        match decision {
            AccessDecision::Allowed => metrics::record_allowed(client_id, service, route),
            AccessDecision::Denied(reason) => {
                metrics::record_denied(client_id, service, route, reason);
                tracing::debug!(
                    client = client_id,
                    service,
                    route,
                    reason = reason.code(),
                    "request denied"
                );
            }
        }
        metrics::record_validation_duration(started.elapsed());
        decision
    }

    fn evaluate(&self, service: &str, route: &str, client_id: &str) -> AccessDecision {
        let Some(config) = self.cache.get(&client_id.to_string()) else {
            metrics::record_cache_lookup(false);
            return AccessDecision::Denied(DenyReason::UnknownClient);
        };
        metrics::record_cache_lookup(true);
        if config.source == ConfigSource::YamlOverride {
            metrics::record_override_hit();
        }

        if !config.active {
            return AccessDecision::Denied(DenyReason::InactiveClient);
        }

        // Deny rules are consulted first: an explicit deny outranks every
        // allow, independent of declaration order.
        let matches = |rule: &gatesync_types::AccessRule| {
            wildcard_match(&rule.service_pattern, service)
                && wildcard_match(&rule.route_pattern, route)
        };
        if config.rules.iter().filter(|r| r.is_deny()).any(|r| matches(r)) {
            return AccessDecision::Denied(DenyReason::DeniedByRule);
        }
        if config.rules.iter().filter(|r| !r.is_deny()).any(|r| matches(r)) {
            return AccessDecision::Allowed;
        }
        AccessDecision::Denied(DenyReason::NoMatchingRule)
    }
}

impl Default for AccessControlEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_config(dto: &ClientAccessDto, source: ConfigSource) -> ClientAccessConfig {
    ClientAccessConfig::new(
        dto.client_id.clone(),
        dto.tenant.clone(),
        dto.active,
        parse_rules(&dto.allow, &dto.client_id),
        source,
    )
}
