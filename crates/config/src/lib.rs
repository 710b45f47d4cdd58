//! Configuration loading for the gatesync core.
//!
//! The schema is deserialized with figment (defaults merged with a YAML file
//! and `GATESYNC_`-prefixed environment variables) and then semantically
//! validated. The local access-override file is additionally watched for
//! changes so overrides can be re-applied without a restart.

pub mod schema;
pub mod watcher;

pub use schema::{
    BusConfig, GatewayConfig, KeySourceConfig, OverrideFile, RefreshConfig, RegistryConfig,
};
pub use watcher::OverrideWatcher;
