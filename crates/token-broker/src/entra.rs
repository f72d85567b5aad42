//! Microsoft Entra ID token issuer
//!
//! Serves all three `TokenRequest` shapes:
//! - Delegated: OAuth2 `refresh_token` grant against
//!   `{authority}/{tenant}/oauth2/v2.0/token`, as the managed application.
//!   Once the application secret has been minted it is sent as
//!   `client_secret`, making the request a confidential-client one.
//! - HostIdentity: the host's managed identity endpoint, pinned to a client id.
//! - LocalChain: delegated to `LocalCredentialChain`.

use std::sync::RwLock;

use common::Secret;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::chain::LocalCredentialChain;
use crate::error::IssuerError;
use crate::issuer::{AccessToken, BoxFuture, SessionContext, TokenIssuer, TokenRequest};
use crate::managed_identity::HostIdentityEndpoint;

/// Public-cloud authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// OAuth error codes that mean "go back to the user", not "try again".
const INTERACTION_ERRORS: &[&str] = &[
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until expiry (delta, not absolute)
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    suberror: Option<String>,
}

pub struct EntraTokenIssuer {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: RwLock<Option<Secret<String>>>,
    host_identity: HostIdentityEndpoint,
    local_chain: LocalCredentialChain,
}

impl EntraTokenIssuer {
    pub fn new(
        http: reqwest::Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            local_chain: LocalCredentialChain::new(http.clone()),
            http,
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: RwLock::new(None),
            host_identity: HostIdentityEndpoint::imds(),
        }
    }

    /// Override the authority (sovereign clouds, tests).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_host_identity(mut self, endpoint: HostIdentityEndpoint) -> Self {
        self.host_identity = endpoint;
        self
    }

    /// Install the application secret used for delegated requests.
    pub fn set_client_secret(&self, secret: Secret<String>) {
        let mut slot = match self.client_secret.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(secret);
        info!(client_id = %self.client_id, "application secret installed for delegated requests");
    }

    fn client_secret(&self) -> Option<Secret<String>> {
        match self.client_secret.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn token_endpoint(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }

    async fn acquire_delegated(
        &self,
        scopes: &[String],
        session: Option<&SessionContext>,
    ) -> Result<AccessToken, IssuerError> {
        let session = session.ok_or_else(|| {
            IssuerError::InteractionRequired("no interactive session established".into())
        })?;

        let scope = scopes.join(" ");
        let secret = self.client_secret();
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", session.refresh_token.expose().as_str()),
            ("scope", scope.as_str()),
        ];
        if let Some(secret) = secret.as_ref() {
            form.push(("client_secret", secret.expose().as_str()));
        }

        debug!(account = %session.account, scope = %scope, "requesting delegated token");

        let response = self
            .http
            .post(self.token_endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| IssuerError::Failed(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(classify_token_error(status.as_u16(), &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IssuerError::Failed(format!("invalid token response: {e}")))?;

        // Out-of-range lifetimes are dropped rather than trusted.
        let expires_on = token
            .expires_in
            .and_then(|secs| OffsetDateTime::now_utc().checked_add(Duration::seconds(secs)));
        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

/// Map a token endpoint error body to an issuer error.
fn classify_token_error(status: u16, body: &str) -> IssuerError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => {
            let needs_user = INTERACTION_ERRORS.contains(&err.error.as_str())
                || err
                    .suberror
                    .as_deref()
                    .is_some_and(|s| INTERACTION_ERRORS.contains(&s));
            let description = err.error_description.unwrap_or_default();
            if needs_user {
                IssuerError::InteractionRequired(format!("{}: {description}", err.error))
            } else {
                IssuerError::Failed(format!(
                    "token endpoint returned {status}: {}: {description}",
                    err.error
                ))
            }
        }
        Err(_) => IssuerError::Failed(format!("token endpoint returned {status}: {body}")),
    }
}

impl TokenIssuer for EntraTokenIssuer {
    fn acquire<'a>(
        &'a self,
        request: TokenRequest<'a>,
    ) -> BoxFuture<'a, Result<AccessToken, IssuerError>> {
        Box::pin(async move {
            match request {
                TokenRequest::Delegated { scopes, session } => {
                    self.acquire_delegated(scopes, session).await
                }
                TokenRequest::LocalChain { scopes } => self.local_chain.acquire(scopes).await,
                TokenRequest::HostIdentity { scopes, client_id } => {
                    self.host_identity
                        .fetch(&self.http, scopes, Some(client_id))
                        .await
                }
            }
        })
    }
}
