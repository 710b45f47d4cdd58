//! Multi-source public-key registry for JWT verification.
//!
//! Each configured source (PEM or JWKS) refreshes on its own interval into a
//! shared snapshot cache; one source's failure never blocks or invalidates
//! another source's cached keys. Lookup resolves `(kid, issuer)` through
//! provider-prefixed, issuer-qualified, and default-source namespaces in
//! that order, and a miss is a normal outcome, not an error.

pub mod fetcher;
pub mod material;
pub mod metrics;
pub mod registry;

pub use fetcher::HttpKeyFetcher;
pub use registry::{PublicKeyRegistry, SourceRefreshOutcome, SourceStats};
