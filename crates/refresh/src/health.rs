//! Health surface for the refresh subsystem.

use gatesync_types::RefreshMode;
use serde::Serialize;

/// The strategy name reported on the health surface.
pub const STRATEGY: &str = "change-notification";

/// Overall health classification.
///
/// Degraded whenever the coordinator is not both event-driven and connected,
/// independent of whether caches are currently stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Degraded,
}

/// A point-in-time health report from the refresh coordinator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub strategy: &'static str,
    pub mode: RefreshMode,
    pub bus_connected: bool,
    pub channel: String,
    pub status: HealthStatus,
}

impl HealthReport {
    /// Derives the report for the given coordinator state.
    #[must_use]
    pub fn evaluate(mode: RefreshMode, bus_connected: bool, channel: impl Into<String>) -> Self {
        let status = if mode == RefreshMode::EventDriven && bus_connected {
            HealthStatus::Up
        } else {
            HealthStatus::Degraded
        };
        Self {
            strategy: STRATEGY,
            mode,
            bus_connected,
            channel: channel.into(),
            status,
        }
    }

    /// Returns `true` when the report is fully healthy.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_requires_event_driven_and_connected() {
        let report = HealthReport::evaluate(RefreshMode::EventDriven, true, "gw-config");
        assert!(report.is_up());
        assert_eq!(report.status, HealthStatus::Up);
    }

    #[test]
    fn test_polling_is_degraded() {
        let report = HealthReport::evaluate(RefreshMode::PollingFallback, false, "gw-config");
        assert!(!report.is_up());
    }

    #[test]
    fn test_disconnected_event_driven_is_degraded() {
        // Connectivity loss degrades health even before the mode flips.
        let report = HealthReport::evaluate(RefreshMode::EventDriven, false, "gw-config");
        assert!(!report.is_up());
    }

    #[test]
    fn test_serialized_shape() {
        let report = HealthReport::evaluate(RefreshMode::PollingFallback, false, "gw-config");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "change-notification");
        assert_eq!(json["mode"], "POLLING_FALLBACK");
        assert_eq!(json["busConnected"], false);
        assert_eq!(json["channel"], "gw-config");
        assert_eq!(json["status"], "degraded");
    }
}
