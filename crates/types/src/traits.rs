//! Async traits shared across all gatesync crates.
//!
//! Every external collaborator is reached through a trait defined here so
//! that higher layers depend only on `gatesync-types`, not on each other,
//! and so tests can inject in-memory fakes through the same constructors
//! production code uses.

use crate::{
    ChangeEvent, ClientAccessDto, PublicKeyInfo, PublicKeySource, RateLimitDefinition,
    RouteDefinition, error::Result,
};
use async_trait::async_trait;

/// The external registry of record for routes, rate limits, and client
/// access configurations.
///
/// Implementations fetch complete lists; incremental updates are modeled as
/// full re-fetches triggered by change notifications.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch every client access configuration.
    async fn fetch_access_configs(&self) -> Result<Vec<ClientAccessDto>>;
    /// Fetch every route definition.
    async fn fetch_routes(&self) -> Result<Vec<RouteDefinition>>;
    /// Fetch every rate-limit definition.
    async fn fetch_rate_limits(&self) -> Result<Vec<RateLimitDefinition>>;
}

/// Fetches and parses the key material served by one configured source.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the source's current key set.
    ///
    /// A successful result carries every usable key the source serves;
    /// individual unusable entries are skipped by the implementation rather
    /// than failing the whole fetch.
    async fn fetch_keys(&self, source: &PublicKeySource) -> Result<Vec<PublicKeyInfo>>;
}

/// An open change-notification subscription.
///
/// The handler boundary lives inside implementations: a malformed or
/// undecodable message is logged, counted, and skipped — it is never
/// surfaced as an error, so one bad payload cannot end delivery. `Err` means
/// the underlying connection failed; `Ok(None)` means the stream closed
/// cleanly. Dropping the subscription releases the connection.
#[async_trait]
pub trait EventSubscription: Send {
    /// Wait for the next decodable event.
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>>;
}

/// The message bus change notifications arrive on.
///
/// Subscriptions are established per-connection; after a failure the
/// coordinator asks for a fresh subscription rather than reusing a broken
/// one.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Open a new subscription to the configured channel.
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>>;
    /// The configured channel name, for health reporting.
    fn channel(&self) -> &str;
}
