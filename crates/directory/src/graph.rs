//! Microsoft Graph implementation of `DirectoryClient`
//!
//! Talks to the v1.0 application endpoints:
//! - `GET  /applications?$filter=appId eq '{client_id}'&$select=id`
//! - `GET  /applications/{id}?$select=passwordCredentials`
//! - `POST /applications/{id}/addPassword`
//! - `POST /applications/{id}/removePassword`
//!
//! The bearer token comes from a `GraphCredential`, which the service wires to
//! the token broker. The same token is decoded to learn the current principal.

use std::sync::Arc;

use common::Secret;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Principal, SecretRecord};
use crate::{BoxFuture, DirectoryClient, claims};

/// Default Graph base URL.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Source of bearer tokens for Graph calls.
pub trait GraphCredential: Send + Sync {
    fn bearer(&self) -> BoxFuture<'_, Result<Secret<String>>>;
}

/// Graph-backed directory client.
pub struct GraphDirectoryClient {
    http: reqwest::Client,
    base_url: String,
    credential: Arc<dyn GraphCredential>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    value: Vec<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationCredentials {
    #[serde(default)]
    password_credentials: Vec<PasswordCredential>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    key_id: String,
    display_name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    end_date_time: Option<OffsetDateTime>,
    secret_text: Option<String>,
}

impl From<PasswordCredential> for SecretRecord {
    fn from(credential: PasswordCredential) -> Self {
        SecretRecord {
            key_id: credential.key_id,
            display_name: credential.display_name,
            expires_at: credential.end_date_time,
            material: credential
                .secret_text
                .filter(|text| !text.is_empty())
                .map(Secret::new),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddPasswordRequest<'a> {
    password_credential: NewPasswordCredential<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPasswordCredential<'a> {
    display_name: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    end_date_time: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemovePasswordRequest<'a> {
    key_id: &'a str,
}

impl GraphDirectoryClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credential: Arc<dyn GraphCredential>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token, send, and turn non-2xx into `Error::Status`.
    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let token = self.credential.bearer().await?;
        let response = request
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| Error::Http(format!("{what} request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        Err(Error::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn resolve_object_id_inner(&self, client_id: &str) -> Result<String> {
        // OData string literals escape a quote by doubling it
        let filter = format!("appId eq '{}'", client_id.replace('\'', "''"));
        let request = self
            .http
            .get(self.url("/applications"))
            .query(&[("$filter", filter.as_str()), ("$select", "id")]);

        let list: ObjectList = self
            .send(request, "application lookup")
            .await?
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("application lookup: {e}")))?;

        let mut ids: Vec<String> = list.value.into_iter().map(|o| o.id).collect();
        match ids.len() {
            0 => Err(Error::NotFound(format!(
                "no application registered with client id {client_id}"
            ))),
            1 => {
                let object_id = ids.remove(0);
                debug!(client_id, object_id = %object_id, "resolved application object id");
                Ok(object_id)
            }
            n => {
                warn!(client_id, matches = n, "client id matched multiple applications");
                Err(Error::AmbiguousApplication(format!(
                    "client id {client_id} matched {n} applications: {}",
                    ids.join(", ")
                )))
            }
        }
    }

    async fn list_secrets_inner(&self, object_id: &str) -> Result<Vec<SecretRecord>> {
        let request = self
            .http
            .get(self.url(&format!("/applications/{object_id}")))
            .query(&[("$select", "passwordCredentials")]);

        let app: ApplicationCredentials = match self.send(request, "list credentials").await {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| Error::InvalidResponse(format!("list credentials: {e}")))?,
            Err(Error::Status { status: 404, .. }) => {
                return Err(Error::NotFound(format!("application object {object_id}")));
            }
            Err(e) => return Err(e),
        };

        Ok(app
            .password_credentials
            .into_iter()
            .map(SecretRecord::from)
            .collect())
    }

    async fn add_secret_inner(
        &self,
        object_id: &str,
        display_name: &str,
        expires_at: OffsetDateTime,
    ) -> Result<SecretRecord> {
        let body = AddPasswordRequest {
            password_credential: NewPasswordCredential {
                display_name,
                end_date_time: expires_at,
            },
        };
        let request = self
            .http
            .post(self.url(&format!("/applications/{object_id}/addPassword")))
            .json(&body);

        let created: PasswordCredential = match self.send(request, "add password").await {
            Ok(response) => response.json().await.map_err(|e| {
                Error::CredentialCreationFailed(format!("unreadable addPassword response: {e}"))
            })?,
            Err(Error::Status { status: 404, .. }) => {
                return Err(Error::NotFound(format!("application object {object_id}")));
            }
            Err(e) => return Err(e),
        };

        let record = SecretRecord::from(created);
        if record.material.is_none() {
            return Err(Error::CredentialCreationFailed(format!(
                "directory returned no secret text for key {}",
                record.key_id
            )));
        }
        Ok(record)
    }

    async fn remove_secret_inner(&self, object_id: &str, key_id: &str) -> Result<()> {
        let request = self
            .http
            .post(self.url(&format!("/applications/{object_id}/removePassword")))
            .json(&RemovePasswordRequest { key_id });
        self.send(request, "remove password").await?;
        Ok(())
    }

    async fn resolve_current_principal_inner(&self) -> Result<Principal> {
        let token = self.credential.bearer().await.map_err(|e| {
            Error::PrincipalResolutionFailed(format!("no directory token for current identity: {e}"))
        })?;
        claims::principal_from_token(token.expose())
    }
}

impl DirectoryClient for GraphDirectoryClient {
    fn resolve_object_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.resolve_object_id_inner(client_id))
    }

    fn list_secrets<'a>(&'a self, object_id: &'a str) -> BoxFuture<'a, Result<Vec<SecretRecord>>> {
        Box::pin(self.list_secrets_inner(object_id))
    }

    fn add_secret<'a>(
        &'a self,
        object_id: &'a str,
        display_name: &'a str,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'a, Result<SecretRecord>> {
        Box::pin(self.add_secret_inner(object_id, display_name, expires_at))
    }

    fn remove_secret<'a>(
        &'a self,
        object_id: &'a str,
        key_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.remove_secret_inner(object_id, key_id))
    }

    fn resolve_current_principal(&self) -> BoxFuture<'_, Result<Principal>> {
        Box::pin(self.resolve_current_principal_inner())
    }
}
