//! Public-key source configuration and cached key material.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SyncError};

/// The format a key source serves its material in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySourceType {
    /// One or more PEM-encoded public key blocks.
    Pem,
    /// An RFC 7517 JSON Web Key Set; may yield many keys.
    Jwks,
}

impl fmt::Display for KeySourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem => write!(f, "pem"),
            Self::Jwks => write!(f, "jwks"),
        }
    }
}

/// A configured origin of verification-key material.
///
/// Sources are loaded once at startup from configuration and are not mutated
/// at runtime. Each source refreshes on its own interval, independent of the
/// others.
#[derive(Debug)]
pub struct PublicKeySource {
    pub id: String,
    pub source_type: KeySourceType,
    pub url: String,
    /// `"basic"` or `"bearer"`; anonymous when absent.
    pub auth_type: Option<String>,
    pub credentials: Option<SecretString>,
    pub refresh_interval_secs: u64,
    pub issuer: Option<String>,
    /// Fallback source consulted when a kid carries no issuer qualification.
    pub is_default: bool,
    /// Namespace cache keys as `sourceId|issuer` to keep issuers that reuse
    /// the same kid from colliding.
    pub use_provider_prefixed_key: bool,
}

/// Cached verification-key material for a single kid.
///
/// Immutable after construction; a source's key set is replaced atomically on
/// refresh, never patched entry-by-entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    pub kid: String,
    pub key_material: String,
    pub key_type: String,
    pub issuer: Option<String>,
    pub source_id: String,
    pub metadata: Option<serde_json::Value>,
}

impl PublicKeyInfo {
    /// Builds a key entry, enforcing the construction invariant.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] when `kid`, `key_material`,
    /// `key_type`, or `source_id` is empty. `issuer` and `metadata` may be
    /// absent.
    pub fn new(
        kid: impl Into<String>,
        key_material: impl Into<String>,
        key_type: impl Into<String>,
        issuer: Option<String>,
        source_id: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self> {
        let kid = kid.into();
        let key_material = key_material.into();
        let key_type = key_type.into();
        let source_id = source_id.into();

        for (field, value) in [
            ("kid", &kid),
            ("keyMaterial", &key_material),
            ("type", &key_type),
            ("sourceId", &source_id),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::Validation(format!(
                    "public key field '{field}' must not be empty"
                )));
            }
        }

        Ok(Self {
            kid,
            key_material,
            key_type,
            issuer,
            source_id,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_source_type_display() {
        assert_eq!(KeySourceType::Pem.to_string(), "pem");
        assert_eq!(KeySourceType::Jwks.to_string(), "jwks");
    }

    #[test]
    fn test_key_info_valid() {
        let key = PublicKeyInfo::new(
            "kid-1",
            "-----BEGIN PUBLIC KEY-----",
            "RSA",
            Some("https://idp.example.com".to_string()),
            "primary",
            None,
        )
        .unwrap();
        assert_eq!(key.kid, "kid-1");
        assert_eq!(key.source_id, "primary");
    }

    #[test]
    fn test_key_info_empty_kid_rejected() {
        let err = PublicKeyInfo::new("", "material", "RSA", None, "primary", None).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(err.to_string().contains("kid"));
    }

    #[test]
    fn test_key_info_blank_material_rejected() {
        let err = PublicKeyInfo::new("kid", "   ", "RSA", None, "primary", None).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_key_info_missing_issuer_allowed() {
        let key = PublicKeyInfo::new("kid", "material", "EC", None, "primary", None).unwrap();
        assert!(key.issuer.is_none());
        assert!(key.metadata.is_none());
    }

    #[test]
    fn test_key_info_empty_source_rejected() {
        let err = PublicKeyInfo::new("kid", "material", "RSA", None, "", None).unwrap_err();
        assert!(err.to_string().contains("sourceId"));
    }
}
