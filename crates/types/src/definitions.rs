//! Route and rate-limit definitions.
//!
//! These two domains are cached and reloaded by the coordinator alongside
//! access configs and key material, but their consumption (route
//! construction, limit enforcement) happens outside this workspace.

use serde::{Deserialize, Serialize};

/// A route definition as served by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    pub id: String,
    pub service: String,
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
}

/// A rate-limit definition as served by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDefinition {
    pub id: String,
    pub client_id: String,
    pub requests_per_window: u64,
    pub window_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_definition_wire_shape() {
        let json = r#"{
            "id": "r-1",
            "service": "user-service",
            "path": "/users/{id}",
            "methods": ["GET"],
            "upstream": "http://user-service:8080"
        }"#;
        let route: RouteDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(route.service, "user-service");
        assert_eq!(route.methods, vec!["GET"]);
    }

    #[test]
    fn test_rate_limit_wire_shape() {
        let json = r#"{
            "id": "rl-1",
            "clientId": "acme",
            "requestsPerWindow": 100,
            "windowSecs": 60
        }"#;
        let limit: RateLimitDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(limit.client_id, "acme");
        assert_eq!(limit.requests_per_window, 100);
    }
}
