//! Token broker for named resources
//!
//! A fixed catalog maps resource names to scopes and a trust flow. The broker
//! turns a name into a short-lived access token, selecting the credential
//! source from the flow and the deployment environment:
//!
//! | flow              | local                    | hosted                          |
//! |-------------------|--------------------------|---------------------------------|
//! | delegated user    | user session             | user session                    |
//! | workload identity | local credential chain   | host identity, pinned client id |
//!
//! Tokens are never cached here. A delegated resource that needs the user to
//! re-consent yields `TokenOutcome::ConsentRequired` instead of an error.

pub mod broker;
pub mod chain;
pub mod entra;
pub mod error;
pub mod issuer;
pub mod managed_identity;
pub mod resource;
pub mod selector;

#[cfg(test)]
mod testing;

pub use broker::TokenBroker;
pub use chain::{LocalCredentialChain, LocalSource};
pub use entra::EntraTokenIssuer;
pub use error::{Error, IssuerError, Result};
pub use issuer::{AccessToken, SessionContext, TokenIssuer, TokenRequest};
pub use managed_identity::HostIdentityEndpoint;
pub use resource::{ResourceCatalog, ResourceScope, TrustFlow};
pub use selector::{
    ConsentChallenge, CredentialPlan, CredentialSelector, DeploymentEnvironment, TokenOutcome,
};
