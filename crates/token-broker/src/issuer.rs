//! Token issuer boundary
//!
//! The selector decides *how* a token is obtained and hands the issuer a
//! `TokenRequest` describing exactly one of the three request shapes. Issuers
//! never choose a flow themselves.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use time::OffsetDateTime;

use crate::error::IssuerError;

/// Boxed future returned by issuer trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bearer credential for one resource.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: Secret<String>,
    /// Issuer-reported expiry, when the issuer reports one
    pub expires_on: Option<OffsetDateTime>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_on: Option<OffsetDateTime>) -> Self {
        Self {
            value: Secret::new(value.into()),
            expires_on,
        }
    }
}

/// The signed-in user's session, as handed over by the hosting application.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Account the session belongs to (home account id or UPN), for logs
    pub account: String,
    pub refresh_token: Secret<String>,
}

/// One token request, in one of the shapes the issuer understands.
#[derive(Debug, Clone, Copy)]
pub enum TokenRequest<'a> {
    /// On behalf of the interactive user session
    Delegated {
        scopes: &'a [String],
        session: Option<&'a SessionContext>,
    },
    /// Developer-machine credential chain (never environment variables)
    LocalChain { scopes: &'a [String] },
    /// Host-assigned identity pinned to an explicit client id
    HostIdentity {
        scopes: &'a [String],
        client_id: &'a str,
    },
}

impl<'a> TokenRequest<'a> {
    pub fn scopes(&self) -> &'a [String] {
        match *self {
            TokenRequest::Delegated { scopes, .. }
            | TokenRequest::LocalChain { scopes }
            | TokenRequest::HostIdentity { scopes, .. } => scopes,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TokenRequest::Delegated { .. } => "delegated",
            TokenRequest::LocalChain { .. } => "local_chain",
            TokenRequest::HostIdentity { .. } => "host_identity",
        }
    }
}

/// External token issuer.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenIssuer>`).
pub trait TokenIssuer: Send + Sync {
    fn acquire<'a>(
        &'a self,
        request: TokenRequest<'a>,
    ) -> BoxFuture<'a, std::result::Result<AccessToken, IssuerError>>;
}
