//! Directory data model

use common::Secret;
use time::OffsetDateTime;

/// The authenticated actor on whose behalf application secrets are minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable directory object id
    pub id: String,
    /// Human readable label (display name or UPN), for logs only
    pub label: String,
}

/// A password credential attached to an application object.
///
/// `material` is only ever populated on the record returned by
/// [`DirectoryClient::add_secret`](crate::DirectoryClient::add_secret). Listing
/// never returns it.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    pub key_id: String,
    pub display_name: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub material: Option<Secret<String>>,
}

impl SecretRecord {
    /// Display name, or empty string for unnamed credentials.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or_default()
    }
}
