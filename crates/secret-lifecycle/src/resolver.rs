//! Bootstrap-time client secret resolution

use std::sync::Arc;

use common::Secret;
use directory::DirectoryClient;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::manager::{Clock, SecretLifecycleManager};

/// Lifetime of secrets minted at bootstrap.
pub const ROTATION_EXPIRATION_HOURS: u32 = 24;

/// Produces the application client secret for this process.
///
/// A configured static secret always wins. Otherwise every call rotates: the
/// current principal's previous secrets are removed and a fresh one is minted.
pub struct RuntimeCredentialResolver {
    client_id: String,
    static_secret: Option<Secret<String>>,
    directory: Arc<dyn DirectoryClient>,
    manager: SecretLifecycleManager,
    // Serializes rotations from this process.
    rotation: Mutex<()>,
}

impl RuntimeCredentialResolver {
    /// Blank static secrets are treated as not configured.
    pub fn new(
        client_id: impl Into<String>,
        static_secret: Option<Secret<String>>,
        directory: Arc<dyn DirectoryClient>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            static_secret: static_secret.filter(|s| !s.is_blank()),
            manager: SecretLifecycleManager::new(directory.clone()),
            directory,
            rotation: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.manager = self.manager.with_clock(clock);
        self
    }

    pub fn has_static_secret(&self) -> bool {
        self.static_secret.is_some()
    }

    /// Return a usable client secret.
    ///
    /// Cleanup trouble, including a missing application during cleanup, is
    /// logged and creation still runs. Principal resolution and creation
    /// failures are returned.
    pub async fn ensure_secret(&self) -> Result<Secret<String>> {
        if let Some(secret) = &self.static_secret {
            info!(client_id = %self.client_id, "using configured static client secret");
            metrics::counter!("secret_rotations_total", "outcome" => "static").increment(1);
            return Ok(secret.clone());
        }

        let _guard = self.rotation.lock().await;
        let result = self.rotate().await;

        let outcome = if result.is_ok() { "rotated" } else { "failed" };
        metrics::counter!("secret_rotations_total", "outcome" => outcome).increment(1);
        result
    }

    async fn rotate(&self) -> Result<Secret<String>> {
        let principal = self
            .directory
            .resolve_current_principal()
            .await
            .map_err(|e| match Error::from(e) {
                e @ Error::PrincipalResolutionFailed(_) => e,
                other => Error::PrincipalResolutionFailed(other.to_string()),
            })?;
        info!(
            principal_id = %principal.id,
            principal = %principal.label,
            client_id = %self.client_id,
            "rotating application secret"
        );

        match self
            .manager
            .cleanup_owned_secrets(&self.client_id, &principal.id)
            .await
        {
            Ok(report) if report.failed > 0 => {
                warn!(
                    principal_id = %principal.id,
                    failed = report.failed,
                    "some previous secrets could not be removed"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(principal_id = %principal.id, error = %e, "secret cleanup failed, continuing");
            }
        }

        self.manager
            .create_user_scoped_secret(&self.client_id, &principal.id, ROTATION_EXPIRATION_HOURS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming;
    use crate::testing::StubDirectory;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2026-10-18 12:00:00 UTC);

    fn resolver(directory: Arc<StubDirectory>, static_secret: Option<&str>) -> RuntimeCredentialResolver {
        RuntimeCredentialResolver::new("app-client-id", static_secret.map(Secret::from), directory)
            .with_clock(Arc::new(|| NOW))
    }

    #[tokio::test]
    async fn static_secret_is_returned_without_directory_calls() {
        let directory = Arc::new(StubDirectory::new());
        let secret = resolver(directory.clone(), Some("s3cr3t"))
            .ensure_secret()
            .await
            .unwrap();

        assert_eq!(secret.expose(), "s3cr3t");
        assert_eq!(directory.total_calls(), 0);
    }

    #[tokio::test]
    async fn blank_static_secret_triggers_rotation() {
        let directory = Arc::new(StubDirectory::new());
        let resolver = resolver(directory.clone(), Some("  "));
        assert!(!resolver.has_static_secret());

        resolver.ensure_secret().await.unwrap();
        assert_eq!(directory.added().len(), 1);
    }

    #[tokio::test]
    async fn fresh_application_gets_exactly_one_secret() {
        let directory = Arc::new(StubDirectory::new());
        let secret = resolver(directory.clone(), None)
            .ensure_secret()
            .await
            .unwrap();

        assert_eq!(secret.expose(), "material-for-new-1");
        let added = directory.added();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].expires_at, NOW + Duration::hours(24));
        assert_eq!(
            naming::parse(&added[0].display_name).unwrap().principal_id,
            "p1"
        );
    }

    #[tokio::test]
    async fn rotation_replaces_previous_secret_and_spares_others() {
        let directory = Arc::new(StubDirectory::new());
        directory.seed("old", &naming::compose("p1", NOW - Duration::days(1)).unwrap());
        directory.seed("colleague", &naming::compose("p2", NOW - Duration::days(1)).unwrap());

        resolver(directory.clone(), None).ensure_secret().await.unwrap();

        assert_eq!(directory.removed(), vec!["old"]);
        assert_eq!(directory.remaining_keys(), vec!["colleague", "new-1"]);
    }

    #[tokio::test]
    async fn removal_failures_do_not_block_creation() {
        let directory = Arc::new(StubDirectory::new().failing_removals());
        directory.seed("old-1", &naming::compose("p1", NOW - Duration::days(2)).unwrap());
        directory.seed("old-2", &naming::compose("p1", NOW - Duration::days(1)).unwrap());

        let secret = resolver(directory.clone(), None).ensure_secret().await;
        assert!(secret.is_ok());
        assert_eq!(directory.remove_attempts(), 2);
        assert_eq!(directory.added().len(), 1);
    }

    #[tokio::test]
    async fn missing_application_during_cleanup_still_attempts_creation() {
        let directory = Arc::new(StubDirectory::new().without_application());
        let err = resolver(directory.clone(), None)
            .ensure_secret()
            .await
            .unwrap_err();

        // Cleanup failure was swallowed; creation then hit the same lookup.
        assert!(matches!(err, Error::ApplicationNotFound(_)), "got: {err}");
        assert_eq!(directory.resolve_calls(), 2);
    }

    #[tokio::test]
    async fn principal_failure_is_fatal() {
        let directory = Arc::new(StubDirectory::new().without_principal());
        let err = resolver(directory.clone(), None)
            .ensure_secret()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PrincipalResolutionFailed(_)), "got: {err}");
        assert_eq!(directory.resolve_calls(), 0);
        assert!(directory.added().is_empty());
    }

    #[tokio::test]
    async fn concurrent_calls_rotate_one_at_a_time() {
        let directory = Arc::new(StubDirectory::new());
        let resolver = Arc::new(resolver(directory.clone(), None));

        let (a, b) = tokio::join!(resolver.ensure_secret(), resolver.ensure_secret());
        assert!(a.is_ok() && b.is_ok());

        // The second rotation removed the first one's secret.
        assert_eq!(directory.added().len(), 2);
        assert_eq!(directory.removed(), vec!["new-1"]);
        assert_eq!(directory.remaining_keys(), vec!["new-2"]);
    }
}
