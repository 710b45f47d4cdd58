//! Access-control metrics emitted through the `metrics` facade.
//!
//! # Metrics
//! - `gatesync_access_requests_total` (counter): requests checked, by client/service/route
//! - `gatesync_access_allowed_total` (counter): allowed decisions
//! - `gatesync_access_denied_total` (counter): denied decisions, with a `reason` tag
//! - `gatesync_access_cache_hits_total` / `gatesync_access_cache_misses_total` (counters)
//! - `gatesync_access_override_hits_total` (counter): decisions served from a YAML override
//! - `gatesync_access_rules_skipped_total` (counter): malformed rules dropped at parse time
//! - `gatesync_access_validation_seconds` (histogram): decision latency
//! - `gatesync_access_refresh_seconds` (histogram): snapshot rebuild latency
//! - `gatesync_access_configs` (gauge): cached client configs

use gatesync_types::DenyReason;
use std::time::Duration;

/// Upper bound on emitted tag values. Anything longer is truncated so that
/// attacker-controlled input cannot inflate metrics-backend cardinality or
/// memory.
pub const MAX_TAG_LEN: usize = 100;

/// Fallback tag value for missing or empty input.
pub const UNKNOWN_TAG: &str = "unknown";

/// Normalizes a tag value: empty or missing becomes `"unknown"`, overlong
/// values are truncated to [`MAX_TAG_LEN`] characters.
#[must_use]
pub fn sanitize_tag(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return UNKNOWN_TAG.to_string();
    }
    if trimmed.chars().count() <= MAX_TAG_LEN {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_TAG_LEN).collect()
    }
}

pub fn record_checked(client: &str, service: &str, route: &str) {
    metrics::counter!(
        "gatesync_access_requests_total",
        "client" => sanitize_tag(client),
        "service" => sanitize_tag(service),
        "route" => sanitize_tag(route)
    )
    .increment(1);
}

pub fn record_allowed(client: &str, service: &str, route: &str) {
    metrics::counter!(
        "gatesync_access_allowed_total",
        "client" => sanitize_tag(client),
        "service" => sanitize_tag(service),
        "route" => sanitize_tag(route)
    )
    .increment(1);
}

pub fn record_denied(client: &str, service: &str, route: &str, reason: DenyReason) {
    metrics::counter!(
        "gatesync_access_denied_total",
        "client" => sanitize_tag(client),
        "service" => sanitize_tag(service),
        "route" => sanitize_tag(route),
        "reason" => reason.code()
    )
    .increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        metrics::counter!("gatesync_access_cache_hits_total").increment(1);
    } else {
        metrics::counter!("gatesync_access_cache_misses_total").increment(1);
    }
}

pub fn record_override_hit() {
    metrics::counter!("gatesync_access_override_hits_total").increment(1);
}

pub fn record_rule_skipped(client: &str) {
    metrics::counter!(
        "gatesync_access_rules_skipped_total",
        "client" => sanitize_tag(client)
    )
    .increment(1);
}

pub fn record_validation_duration(elapsed: Duration) {
    metrics::histogram!("gatesync_access_validation_seconds").record(elapsed.as_secs_f64());
}

pub fn record_refresh_duration(elapsed: Duration) {
    metrics::histogram!("gatesync_access_refresh_seconds").record(elapsed.as_secs_f64());
}

#[allow(clippy::cast_precision_loss)]
pub fn record_config_count(count: usize) {
    metrics::gauge!("gatesync_access_configs").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_empty_becomes_unknown() {
        assert_eq!(sanitize_tag(""), "unknown");
        assert_eq!(sanitize_tag("   "), "unknown");
    }

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(sanitize_tag("payment-service"), "payment-service");
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_tag("  acme "), "acme");
    }

    #[test]
    fn test_sanitize_truncates_long_values() {
        let long = "x".repeat(500);
        let out = sanitize_tag(&long);
        assert_eq!(out.chars().count(), MAX_TAG_LEN);
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let out = sanitize_tag(&long);
        assert_eq!(out.chars().count(), MAX_TAG_LEN);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_exactly_max_len_untouched() {
        let exact = "a".repeat(MAX_TAG_LEN);
        assert_eq!(sanitize_tag(&exact), exact);
    }
}
