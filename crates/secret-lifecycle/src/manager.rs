//! Per-principal application secrets
//!
//! Rotation for one principal runs:
//! resolve object id → list → keep only this principal's secrets → remove each
//! (best effort) → create a new one.
//!
//! Removals are sequential and always finish before creation starts.

use std::collections::HashMap;
use std::sync::Arc;

use common::Secret;
use directory::DirectoryClient;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::naming;

/// Source of "now"; injectable for tests.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Secrets owned by the principal and successfully removed
    pub removed: usize,
    /// Secrets owned by the principal whose removal failed
    pub failed: usize,
    /// Secrets left alone (other principals, or not minted by us)
    pub skipped: usize,
}

pub struct SecretLifecycleManager {
    directory: Arc<dyn DirectoryClient>,
    object_ids: RwLock<HashMap<String, String>>,
    clock: Clock,
}

impl SecretLifecycleManager {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            directory,
            object_ids: RwLock::new(HashMap::new()),
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Object id for `client_id`, resolved once and cached.
    ///
    /// Two concurrent first calls may both hit the directory; they resolve to
    /// the same id, so the last write wins harmlessly.
    pub async fn object_id(&self, client_id: &str) -> Result<String> {
        if let Some(id) = self.object_ids.read().await.get(client_id) {
            return Ok(id.clone());
        }

        let object_id = self.directory.resolve_object_id(client_id).await?;
        debug!(client_id, object_id = %object_id, "resolved application object id");
        self.object_ids
            .write()
            .await
            .insert(client_id.to_string(), object_id.clone());
        Ok(object_id)
    }

    /// Remove every secret minted for `principal_id` on the application.
    ///
    /// Fails only when the application itself cannot be resolved or listed.
    /// Individual removal failures are logged and counted.
    pub async fn cleanup_owned_secrets(
        &self,
        client_id: &str,
        principal_id: &str,
    ) -> Result<CleanupReport> {
        let object_id = self.object_id(client_id).await?;
        let records = self.directory.list_secrets(&object_id).await?;

        let mut report = CleanupReport::default();
        for record in &records {
            if !naming::is_owned_by(record.display_name(), principal_id) {
                report.skipped += 1;
                continue;
            }

            match self.directory.remove_secret(&object_id, &record.key_id).await {
                Ok(()) => {
                    info!(
                        key_id = %record.key_id,
                        display_name = record.display_name(),
                        "removed previous secret"
                    );
                    metrics::counter!("secret_cleanup_removed_total").increment(1);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(key_id = %record.key_id, error = %e, "failed to remove previous secret");
                    metrics::counter!("secret_cleanup_failures_total").increment(1);
                    report.failed += 1;
                }
            }
        }

        debug!(
            principal_id,
            removed = report.removed,
            failed = report.failed,
            skipped = report.skipped,
            "secret cleanup finished"
        );
        Ok(report)
    }

    /// Add a secret named `display_name` expiring `expiration_hours` from now.
    pub async fn create_secret(
        &self,
        client_id: &str,
        display_name: &str,
        expiration_hours: u32,
    ) -> Result<Secret<String>> {
        let now = (self.clock)();
        self.create_at(client_id, display_name, now, expiration_hours)
            .await
    }

    /// Add a secret following the per-principal naming convention.
    pub async fn create_user_scoped_secret(
        &self,
        client_id: &str,
        principal_id: &str,
        expiration_hours: u32,
    ) -> Result<Secret<String>> {
        // Same instant for the name and the expiry.
        let now = (self.clock)();
        let display_name = naming::compose(principal_id, now)?;
        self.create_at(client_id, &display_name, now, expiration_hours)
            .await
    }

    async fn create_at(
        &self,
        client_id: &str,
        display_name: &str,
        now: OffsetDateTime,
        expiration_hours: u32,
    ) -> Result<Secret<String>> {
        let expires_at = now
            .checked_add(Duration::hours(i64::from(expiration_hours)))
            .ok_or_else(|| {
                Error::CredentialCreationFailed(format!(
                    "expiry {expiration_hours}h after {now} is out of range"
                ))
            })?;
        let object_id = self.object_id(client_id).await?;

        let record = self
            .directory
            .add_secret(&object_id, display_name, expires_at)
            .await?;

        let material = record
            .material
            .filter(|m| !m.is_blank())
            .ok_or_else(|| {
                Error::CredentialCreationFailed(format!(
                    "directory returned no secret material for {display_name}"
                ))
            })?;

        info!(
            key_id = %record.key_id,
            display_name,
            expires_at = %expires_at,
            "created application secret"
        );
        Ok(material)
    }
}
