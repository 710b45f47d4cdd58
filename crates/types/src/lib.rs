//! Core types and traits for the gatesync workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gatesync synchronization core: the unified error type, the access-control
//! and key-registry data model, change-notification payloads, and the async
//! traits each external collaborator is accessed through.

pub mod access;
pub mod definitions;
pub mod error;
pub mod event;
pub mod keys;
pub mod time;
pub mod traits;

pub use access::{
    AccessDecision, AccessRule, ClientAccessConfig, ClientAccessDto, ConfigSource, DenyReason,
    RuleEffect,
};
pub use definitions::{RateLimitDefinition, RouteDefinition};
pub use error::SyncError;
pub use event::{ChangeEvent, ChangeEventType, ChangeOperation, RefreshMode};
pub use keys::{KeySourceType, PublicKeyInfo, PublicKeySource};
pub use traits::{EventBus, EventSubscription, KeyFetcher, RegistrySource};
