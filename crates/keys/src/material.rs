//! Parsing of fetched key material into cache entries.
//!
//! Both parsers apply per-entry granularity: an unusable entry is skipped
//! with a warning and the rest of the document still loads. Only an
//! entirely undecodable document fails the fetch.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatesync_types::{PublicKeyInfo, PublicKeySource, SyncError, error::Result};
use serde::Deserialize;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Splits a PEM document into one entry per public-key block.
///
/// PEM carries no key id, so the kid is derived from the source id: the
/// first block is named after the source itself, further blocks get a
/// numeric suffix.
///
/// # Errors
///
/// Returns [`SyncError::Config`] when the document contains no public-key
/// block at all.
pub fn parse_pem(source: &PublicKeySource, body: &str) -> Result<Vec<PublicKeyInfo>> {
    let mut keys = Vec::new();
    let mut rest = body;
    let mut index = 0usize;

    while let Some(start) = rest.find(PEM_BEGIN) {
        let Some(end) = rest[start..].find(PEM_END) else {
            tracing::warn!(source = source.id.as_str(), "unterminated PEM block skipped");
            break;
        };
        let block = &rest[start..start + end + PEM_END.len()];
        let kid = if index == 0 {
            source.id.clone()
        } else {
            format!("{}-{index}", source.id)
        };
        match PublicKeyInfo::new(
            kid,
            block.to_string(),
            "PEM",
            source.issuer.clone(),
            source.id.clone(),
            None,
        ) {
            Ok(key) => keys.push(key),
            Err(e) => {
                tracing::warn!(source = source.id.as_str(), error = %e, "skipping invalid PEM block");
            }
        }
        index += 1;
        rest = &rest[start + end + PEM_END.len()..];
    }

    if keys.is_empty() {
        return Err(SyncError::Config(format!(
            "source '{}' returned no PEM public key blocks",
            source.id
        )));
    }
    Ok(keys)
}

/// One entry of a JWKS document. Fields beyond the required pair are
/// retained in `extra` and surfaced as entry metadata.
#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// Parses a JWKS document; each usable JWK becomes one cache entry.
///
/// Entries missing `kid` or `kty`, or whose key parameters are not valid
/// base64url, are skipped with a warning.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`] when the document itself is not
/// valid JWKS JSON.
pub fn parse_jwks(source: &PublicKeySource, body: &str) -> Result<Vec<PublicKeyInfo>> {
    let document: JwksDocument = serde_json::from_str(body)?;
    let mut keys = Vec::with_capacity(document.keys.len());

    for jwk in document.keys {
        let (Some(kid), Some(kty)) = (jwk.kid.clone(), jwk.kty.clone()) else {
            tracing::warn!(source = source.id.as_str(), "skipping JWK without kid or kty");
            continue;
        };
        if !key_params_decode(&jwk.extra) {
            tracing::warn!(
                source = source.id.as_str(),
                kid = kid.as_str(),
                "skipping JWK with undecodable key parameters"
            );
            continue;
        }

        // The serialized JWK itself is the key material handed to the JWT
        // verifier; issuer comes from the JWK when present, else the source.
        let issuer = jwk
            .extra
            .get("iss")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .or_else(|| source.issuer.clone());
        let mut material = serde_json::Map::new();
        material.insert("kid".to_string(), serde_json::Value::String(kid.clone()));
        material.insert("kty".to_string(), serde_json::Value::String(kty.clone()));
        for (k, v) in &jwk.extra {
            material.insert(k.clone(), v.clone());
        }
        let material = serde_json::Value::Object(material);

        match PublicKeyInfo::new(
            kid,
            material.to_string(),
            kty,
            issuer,
            source.id.clone(),
            Some(serde_json::Value::Object(jwk.extra)),
        ) {
            Ok(key) => keys.push(key),
            Err(e) => {
                tracing::warn!(source = source.id.as_str(), error = %e, "skipping invalid JWK");
            }
        }
    }

    Ok(keys)
}

/// Checks that the base64url-encoded key parameters a verifier would use
/// actually decode. Absent parameters pass; garbage fails the entry.
fn key_params_decode(extra: &serde_json::Map<String, serde_json::Value>) -> bool {
    ["n", "e", "x", "y"].iter().all(|param| {
        match extra.get(*param).and_then(|v| v.as_str()) {
            Some(value) => URL_SAFE_NO_PAD.decode(value).is_ok(),
            None => true,
        }
    })
}
