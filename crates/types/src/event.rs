//! Change-notification payloads and the refresh-mode state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which configuration domain a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEventType {
    RouteConfig,
    RateLimitConfig,
    AccessConfig,
    KeyConfig,
    /// Registry-side bulk change; reload every domain.
    Full,
    /// Forward-compatibility: event types this build does not know yet are
    /// treated as a full reload rather than rejected.
    #[serde(other)]
    Unknown,
}

/// The operation that triggered the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

/// An inbound change notification, as published on the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_id: Uuid,
    /// ISO-8601 publication timestamp. Carried for logging only; the core
    /// re-fetches state on every notification and never orders by time.
    pub timestamp: String,
    pub event_type: ChangeEventType,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default)]
    pub client_ids: Vec<String>,
    pub operation: ChangeOperation,
}

/// The process-wide refresh strategy state.
///
/// Mutated only by the refresh coordinator; read by the health reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshMode {
    EventDriven,
    PollingFallback,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventDriven => write!(f, "EVENT_DRIVEN"),
            Self::PollingFallback => write!(f, "POLLING_FALLBACK"),
        }
    }
}
