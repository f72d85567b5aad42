//! Host-assigned (managed) identity endpoint
//!
//! Two transports serve the same token shape:
//! - IMDS on VMs/AKS: `GET http://169.254.169.254/metadata/identity/oauth2/token`
//!   with `Metadata: true`
//! - App Service / Container Apps: `GET $IDENTITY_ENDPOINT` with
//!   `X-IDENTITY-HEADER: $IDENTITY_HEADER`
//!
//! Both take a single `resource` (the first scope without `/.default`) and an
//! optional `client_id` selecting a user-assigned identity.

use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::IssuerError;
use crate::issuer::AccessToken;

/// IMDS token endpoint.
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// How long a reachability probe may take before IMDS is considered absent.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the host exposes its managed identity.
#[derive(Debug, Clone)]
pub enum HostIdentityEndpoint {
    Imds { url: String },
    AppService { endpoint: String, header: Secret<String> },
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityError {
    error: Option<String>,
    error_description: Option<String>,
}

impl HostIdentityEndpoint {
    /// The standard IMDS endpoint.
    pub fn imds() -> Self {
        HostIdentityEndpoint::Imds {
            url: IMDS_TOKEN_URL.to_string(),
        }
    }

    /// Pick the transport the host advertises.
    ///
    /// Called once at startup. App Service and Container Apps set
    /// `IDENTITY_ENDPOINT` and `IDENTITY_HEADER`; everything else uses IMDS.
    pub fn detect() -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) if !endpoint.is_empty() && !header.is_empty() => {
                HostIdentityEndpoint::AppService {
                    endpoint,
                    header: Secret::new(header),
                }
            }
            _ => Self::imds(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HostIdentityEndpoint::Imds { .. } => "imds",
            HostIdentityEndpoint::AppService { .. } => "app_service",
        }
    }

    /// Quick TCP probe; `AppService` endpoints are assumed present.
    pub async fn is_reachable(&self) -> bool {
        let url = match self {
            HostIdentityEndpoint::Imds { url } => url,
            HostIdentityEndpoint::AppService { .. } => return true,
        };
        let Some(addr) = reqwest::Url::parse(url).ok().and_then(|u| {
            let host = u.host_str()?.to_string();
            let port = u.port_or_known_default()?;
            Some(format!("{host}:{port}"))
        }) else {
            return false;
        };

        tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(addr))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Request a token for `scopes` from the host identity.
    pub async fn fetch(
        &self,
        http: &reqwest::Client,
        scopes: &[String],
        client_id: Option<&str>,
    ) -> Result<AccessToken, IssuerError> {
        let resource = resource_for_scopes(scopes)?;

        let mut query: Vec<(&str, &str)> = vec![("resource", resource.as_str())];
        if let Some(id) = client_id {
            query.push(("client_id", id));
        }

        let request = match self {
            HostIdentityEndpoint::Imds { url } => {
                query.push(("api-version", IMDS_API_VERSION));
                http.get(url).header("Metadata", "true").query(&query)
            }
            HostIdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                http.get(endpoint)
                    .header("X-IDENTITY-HEADER", header.expose().as_str())
                    .query(&query)
            }
        };

        debug!(endpoint = self.label(), resource = %resource, "requesting managed identity token");

        let response = request
            .send()
            .await
            .map_err(|e| IssuerError::Failed(format!("managed identity request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            let detail = serde_json::from_str::<ManagedIdentityError>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or(body);
            return Err(IssuerError::Failed(format!(
                "managed identity endpoint returned {status}: {detail}"
            )));
        }

        let token: ManagedIdentityToken = response.json().await.map_err(|e| {
            IssuerError::Failed(format!("invalid managed identity token response: {e}"))
        })?;

        Ok(AccessToken::new(
            token.access_token,
            token.expires_on.as_ref().and_then(unix_timestamp),
        ))
    }
}

/// Managed identity speaks v1 `resource`, not v2 scopes.
pub fn resource_for_scopes(scopes: &[String]) -> Result<String, IssuerError> {
    let first = scopes
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .ok_or_else(|| IssuerError::Failed("no scope to derive a resource from".into()))?;
    Ok(first.strip_suffix("/.default").unwrap_or(first).to_string())
}

/// Parse `expires_on`, which arrives as a number or a numeric string.
fn unix_timestamp(value: &serde_json::Value) -> Option<OffsetDateTime> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    OffsetDateTime::from_unix_timestamp(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// Mock endpoint echoing the query back inside the token value.
    async fn start_mock_identity() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/token",
            get(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    let authorized = headers.get("Metadata").is_some()
                        || headers.get("X-IDENTITY-HEADER").is_some();
                    if !authorized {
                        return (
                            StatusCode::BAD_REQUEST,
                            r#"{"error":"invalid_request","error_description":"Required metadata header not specified"}"#
                                .to_string(),
                        );
                    }
                    if q.get("client_id").map(String::as_str) == Some("unknown") {
                        return (
                            StatusCode::BAD_REQUEST,
                            r#"{"error":"invalid_request","error_description":"Identity not found"}"#
                                .to_string(),
                        );
                    }
                    let value = format!(
                        "{}|{}|{}",
                        q.get("resource").cloned().unwrap_or_default(),
                        q.get("client_id").cloned().unwrap_or_default(),
                        q.get("api-version").cloned().unwrap_or_default()
                    );
                    (
                        StatusCode::OK,
                        serde_json::json!({
                            "access_token": value,
                            "expires_on": "1760824800",
                            "token_type": "Bearer"
                        })
                        .to_string(),
                    )
                },
            ),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    #[test]
    fn resource_strips_default_suffix() {
        let resource =
            resource_for_scopes(&scopes(&["https://cognitiveservices.azure.com/.default"]))
                .unwrap();
        assert_eq!(resource, "https://cognitiveservices.azure.com");
    }

    #[test]
    fn resource_requires_a_scope() {
        assert!(resource_for_scopes(&[]).is_err());
        assert!(resource_for_scopes(&scopes(&["  "])).is_err());
    }

    #[test]
    fn expires_on_accepts_string_and_number() {
        let expected = OffsetDateTime::from_unix_timestamp(1_760_824_800).unwrap();
        assert_eq!(
            unix_timestamp(&serde_json::json!("1760824800")),
            Some(expected)
        );
        assert_eq!(unix_timestamp(&serde_json::json!(1760824800)), Some(expected));
        assert_eq!(unix_timestamp(&serde_json::json!(null)), None);
    }

    #[tokio::test]
    async fn imds_request_carries_resource_client_id_and_metadata_header() {
        let url = start_mock_identity().await;
        let endpoint = HostIdentityEndpoint::Imds { url };
        let token = endpoint
            .fetch(
                &reqwest::Client::new(),
                &scopes(&["https://cognitiveservices.azure.com/.default"]),
                Some("uami-client-id"),
            )
            .await
            .unwrap();

        assert_eq!(
            token.value.expose(),
            "https://cognitiveservices.azure.com|uami-client-id|2018-02-01"
        );
        assert_eq!(
            token.expires_on,
            OffsetDateTime::from_unix_timestamp(1_760_824_800).ok()
        );
    }

    #[tokio::test]
    async fn app_service_request_uses_identity_header() {
        let url = start_mock_identity().await;
        let endpoint = HostIdentityEndpoint::AppService {
            endpoint: url,
            header: Secret::from("header-secret"),
        };
        let token = endpoint
            .fetch(&reqwest::Client::new(), &scopes(&["api://backend/.default"]), None)
            .await
            .unwrap();
        assert_eq!(token.value.expose(), "api://backend||2019-08-01");
    }

    #[tokio::test]
    async fn error_description_is_surfaced() {
        let url = start_mock_identity().await;
        let endpoint = HostIdentityEndpoint::Imds { url };
        let err = endpoint
            .fetch(&reqwest::Client::new(), &scopes(&["api://x/.default"]), Some("unknown"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Identity not found"), "got: {err}");
    }

    #[tokio::test]
    async fn probe_detects_listening_endpoint() {
        let url = start_mock_identity().await;
        assert!(HostIdentityEndpoint::Imds { url }.is_reachable().await);
        let closed = HostIdentityEndpoint::Imds {
            url: "http://127.0.0.1:1/token".into(),
        };
        assert!(!closed.is_reachable().await);
    }
}
