//! Per-resource token acquisition
//!
//! The broker owns the resource catalog and the optional user session. Tokens
//! are not cached: each `get_token` is one issuer round trip, and the caller
//! discards the token after use.

use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::issuer::SessionContext;
use crate::resource::{ResourceCatalog, TrustFlow};
use crate::selector::{CredentialSelector, TokenOutcome};

pub struct TokenBroker {
    catalog: ResourceCatalog,
    selector: CredentialSelector,
    session: RwLock<Option<SessionContext>>,
}

impl TokenBroker {
    pub fn new(catalog: ResourceCatalog, selector: CredentialSelector) -> Self {
        info!(
            resources = catalog.len(),
            environment = selector.environment().as_str(),
            "token broker initialized"
        );
        Self {
            catalog,
            selector,
            session: RwLock::new(None),
        }
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Replace the interactive session used for delegated resources.
    pub fn set_session(&self, session: Option<SessionContext>) {
        let mut slot = match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = session;
    }

    fn session(&self) -> Option<SessionContext> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Acquire a token for the named resource.
    ///
    /// Consent and configuration problems come back unchanged; every other
    /// failure is reported as `TokenAcquisitionFailed`.
    pub async fn get_token(&self, resource_name: &str) -> Result<TokenOutcome> {
        let Some(resource) = self.catalog.get(resource_name) else {
            metrics::counter!(
                "broker_token_requests_total",
                "resource" => resource_name.to_string(),
                "flow" => "unknown",
                "outcome" => "unknown_resource"
            )
            .increment(1);
            return Err(Error::UnknownResource(resource_name.to_string()));
        };

        let session = match resource.flow {
            TrustFlow::DelegatedUser => self.session(),
            TrustFlow::WorkloadIdentity => None,
        };

        let result = self.selector.acquire(resource, session.as_ref()).await;

        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(Error::Configuration(_)) => "configuration_error",
            Err(_) => "failed",
        };
        metrics::counter!(
            "broker_token_requests_total",
            "resource" => resource.name.clone(),
            "flow" => resource.flow.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    /// Best-effort acquisition for every delegated resource.
    ///
    /// Surfaces consent prompts early. Workload-identity resources are skipped;
    /// they are cheap to acquire on demand. Nothing here fails the caller.
    pub async fn prewarm_all(&self) {
        for resource in self.catalog.iter() {
            if resource.flow != TrustFlow::DelegatedUser {
                debug!(resource = %resource.name, "skipping prewarm for workload identity resource");
                continue;
            }

            match self.get_token(&resource.name).await {
                Ok(TokenOutcome::Acquired(_)) => {
                    info!(resource = %resource.name, "prewarmed delegated token");
                }
                Ok(TokenOutcome::ConsentRequired(challenge)) => {
                    warn!(
                        resource = %resource.name,
                        reason = %challenge.reason,
                        "prewarm: user consent required"
                    );
                }
                Err(e) => {
                    warn!(resource = %resource.name, error = %e, "prewarm failed");
                }
            }
        }
    }
}
