//! Trust-flow selection
//!
//! The deployment environment is decided once at startup and injected here;
//! nothing in this module probes the process environment. Selection is a pure
//! function (`plan`) so each flow can be tested without an issuer.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, IssuerError, Result};
use crate::issuer::{AccessToken, SessionContext, TokenIssuer, TokenRequest};
use crate::resource::{ResourceScope, TrustFlow};

/// Where the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnvironment {
    /// Developer machine
    Local,
    /// Production host with an assigned managed identity
    Hosted,
}

impl DeploymentEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Local => "local",
            DeploymentEnvironment::Hosted => "hosted",
        }
    }
}

/// Result of a successful selection and acquisition.
///
/// Consent is a normal outcome, not an error: callers must decide whether to
/// send the user back through sign-in. Retrying will not help.
#[must_use]
#[derive(Debug, Clone)]
pub enum TokenOutcome {
    Acquired(AccessToken),
    ConsentRequired(ConsentChallenge),
}

impl TokenOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TokenOutcome::Acquired(_) => "acquired",
            TokenOutcome::ConsentRequired(_) => "consent_required",
        }
    }
}

/// Details for re-prompting the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentChallenge {
    pub resource: String,
    pub scopes: Vec<String>,
    pub reason: String,
}

/// Which request shape a resource resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPlan<'a> {
    Delegated,
    LocalChain,
    HostIdentity { client_id: &'a str },
}

pub struct CredentialSelector {
    environment: DeploymentEnvironment,
    identity_client_id: Option<String>,
    issuer: Arc<dyn TokenIssuer>,
}

impl CredentialSelector {
    /// Blank identity client ids are treated as absent.
    pub fn new(
        environment: DeploymentEnvironment,
        identity_client_id: Option<String>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            environment,
            identity_client_id: identity_client_id.filter(|id| !id.trim().is_empty()),
            issuer,
        }
    }

    pub fn environment(&self) -> DeploymentEnvironment {
        self.environment
    }

    /// Decide how a token for `flow` is obtained in this environment.
    ///
    /// Hosted workload identity without a configured client id is a deployment
    /// defect and fails here, before any issuer call.
    pub fn plan(&self, flow: TrustFlow) -> Result<CredentialPlan<'_>> {
        match (flow, self.environment) {
            (TrustFlow::DelegatedUser, _) => Ok(CredentialPlan::Delegated),
            (TrustFlow::WorkloadIdentity, DeploymentEnvironment::Local) => {
                Ok(CredentialPlan::LocalChain)
            }
            (TrustFlow::WorkloadIdentity, DeploymentEnvironment::Hosted) => {
                match self.identity_client_id.as_deref() {
                    Some(client_id) => Ok(CredentialPlan::HostIdentity { client_id }),
                    None => Err(Error::Configuration(
                        "hosted workload identity requires an identity client id".into(),
                    )),
                }
            }
        }
    }

    /// Acquire a token for `resource` using the planned flow.
    pub async fn acquire(
        &self,
        resource: &ResourceScope,
        session: Option<&SessionContext>,
    ) -> Result<TokenOutcome> {
        let plan = self.plan(resource.flow)?;
        let scopes = resource.scopes.as_slice();
        let request = match plan {
            CredentialPlan::Delegated => TokenRequest::Delegated { scopes, session },
            CredentialPlan::LocalChain => TokenRequest::LocalChain { scopes },
            CredentialPlan::HostIdentity { client_id } => {
                TokenRequest::HostIdentity { scopes, client_id }
            }
        };

        debug!(
            resource = %resource.name,
            request = request.kind(),
            environment = self.environment.as_str(),
            "acquiring token"
        );

        match self.issuer.acquire(request).await {
            Ok(token) => Ok(TokenOutcome::Acquired(token)),
            Err(IssuerError::InteractionRequired(reason)) if plan == CredentialPlan::Delegated => {
                warn!(resource = %resource.name, reason = %reason, "consent required");
                Ok(TokenOutcome::ConsentRequired(ConsentChallenge {
                    resource: resource.name.clone(),
                    scopes: resource.scopes.clone(),
                    reason,
                }))
            }
            Err(e) => Err(Error::TokenAcquisitionFailed(format!(
                "{} ({}): {e}",
                resource.name,
                request.kind()
            ))),
        }
    }
}
