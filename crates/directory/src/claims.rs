//! Principal extraction from access token claims
//!
//! The directory token already names the caller: `oid` is the stable object id
//! of the user or managed identity, and one of `name`, `upn`,
//! `preferred_username` or `app_displayname` gives a readable label. Reading
//! the payload avoids a second round trip and works for both delegated and
//! app-only tokens, where `/me` would not.
//!
//! The signature is not verified; the token was just issued to us over TLS and
//! is only used to learn our own identity.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::Principal;

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    oid: Option<String>,
    name: Option<String>,
    upn: Option<String>,
    preferred_username: Option<String>,
    app_displayname: Option<String>,
}

/// Decode the principal from a JWT access token.
pub fn principal_from_token(token: &str) -> Result<Principal> {
    let payload = token.split('.').nth(1).ok_or_else(|| {
        Error::PrincipalResolutionFailed("access token is not a JWT (missing payload)".into())
    })?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::PrincipalResolutionFailed(format!("token payload not base64url: {e}")))?;

    let claims: IdentityClaims = serde_json::from_slice(&bytes)
        .map_err(|e| Error::PrincipalResolutionFailed(format!("token payload not JSON: {e}")))?;

    let id = claims
        .oid
        .filter(|oid| !oid.trim().is_empty())
        .ok_or_else(|| Error::PrincipalResolutionFailed("token has no oid claim".into()))?;

    let label = claims
        .name
        .or(claims.upn)
        .or(claims.preferred_username)
        .or(claims.app_displayname)
        .unwrap_or_else(|| id.clone());

    Ok(Principal { id, label })
}
