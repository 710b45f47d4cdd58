//! Rule-string parsing.
//!
//! A rule is `"<servicePattern>:<routePattern>"` with an optional leading
//! `!` marking a deny rule. Parsing compiles each string once at load time;
//! malformed entries are skipped with a warning so the rest of a client's
//! rule list still loads.

use crate::metrics;
use gatesync_types::{AccessRule, RuleEffect, SyncError, error::Result};

/// Parses a single rule string.
///
/// # Errors
///
/// Returns [`SyncError::Config`] when the separator is missing or either
/// pattern is empty.
pub fn parse_rule(raw: &str) -> Result<AccessRule> {
    let trimmed = raw.trim();
    let (effect, body) = match trimmed.strip_prefix('!') {
        Some(rest) => (RuleEffect::Deny, rest),
        None => (RuleEffect::Allow, trimmed),
    };

    let Some((service, route)) = body.split_once(':') else {
        return Err(SyncError::Config(format!(
            "rule '{trimmed}' is missing the ':' separator"
        )));
    };
    if service.is_empty() || route.is_empty() {
        return Err(SyncError::Config(format!(
            "rule '{trimmed}' has an empty service or route pattern"
        )));
    }

    Ok(AccessRule {
        service_pattern: service.to_string(),
        route_pattern: route.to_string(),
        effect,
        raw: trimmed.to_string(),
    })
}

/// Parses a client's rule list with partial-success semantics.
///
/// Each malformed entry is logged, counted, and skipped; the remaining rules
/// still load. An entirely malformed list yields an empty (deny-by-default)
/// rule set rather than an error.
#[must_use]
pub fn parse_rules(raws: &[String], client_id: &str) -> Vec<AccessRule> {
    let mut rules = Vec::with_capacity(raws.len());
    for raw in raws {
        match parse_rule(raw) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(client = client_id, rule = raw.as_str(), error = %e, "skipping malformed access rule");
                metrics::record_rule_skipped(client_id);
            }
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allow_rule() {
        let rule = parse_rule("payment-service:charge").unwrap();
        assert_eq!(rule.effect, RuleEffect::Allow);
        assert_eq!(rule.service_pattern, "payment-service");
        assert_eq!(rule.route_pattern, "charge");
        assert_eq!(rule.raw, "payment-service:charge");
    }

    #[test]
    fn test_parse_deny_rule() {
        let rule = parse_rule("!payment-service:refund").unwrap();
        assert_eq!(rule.effect, RuleEffect::Deny);
        assert_eq!(rule.service_pattern, "payment-service");
        assert!(rule.is_deny());
    }

    #[test]
    fn test_parse_wildcards() {
        let rule = parse_rule("*:*").unwrap();
        assert_eq!(rule.service_pattern, "*");
        assert_eq!(rule.route_pattern, "*");
    }

    #[test]
    fn test_route_pattern_may_contain_colon() {
        // Only the first ':' separates service from route.
        let rule = parse_rule("svc:path:sub").unwrap();
        assert_eq!(rule.service_pattern, "svc");
        assert_eq!(rule.route_pattern, "path:sub");
    }

    #[test]
    fn test_parse_missing_separator() {
        let err = parse_rule("payment-service").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn test_parse_empty_sides() {
        assert!(parse_rule(":route").is_err());
        assert!(parse_rule("service:").is_err());
        assert!(parse_rule("!:").is_err());
    }

    #[test]
    fn test_parse_rules_partial_success() {
        let raws = vec![
            "user-service:*".to_string(),
            "not-a-rule".to_string(),
            "!user-service:delete-account".to_string(),
        ];
        let rules = parse_rules(&raws, "acme");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].effect, RuleEffect::Allow);
        assert_eq!(rules[1].effect, RuleEffect::Deny);
    }

    #[test]
    fn test_parse_rules_all_malformed_is_empty() {
        let raws = vec!["x".to_string(), ":".to_string()];
        assert!(parse_rules(&raws, "acme").is_empty());
    }
}
