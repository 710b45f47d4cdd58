//! Refresh coordination: retry policy, change-notification subscription,
//! and the event-driven/polling-fallback state machine that keeps every
//! cached configuration domain fresh.
//!
//! The coordinator never blocks request traffic and never partially applies
//! a reload: a reload that cannot complete after bounded retries keeps the
//! previous snapshot, records the failure, and degrades the reported health
//! instead of crashing anything.

pub mod bus;
pub mod coordinator;
pub mod health;
pub mod retry;

pub use bus::{SseEventBus, SseEventSubscription};
pub use coordinator::{CoordinatorSettings, RefreshCoordinator, RefreshSummary};
pub use health::{HealthReport, HealthStatus};
pub use retry::{Backoff, RetryPolicy};
