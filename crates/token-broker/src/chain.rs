//! Local development credential chain
//!
//! Tries each source in order and remembers the first one that worked, so later
//! requests go straight to it. Sources:
//! 1. Host identity via IMDS, only when the endpoint answers a TCP probe
//! 2. Azure CLI: `az account get-access-token --scope ... --output json`
//! 3. Azure Developer CLI: `azd auth token --scope ... --output json`
//!
//! Service-principal secrets in environment variables (`AZURE_CLIENT_SECRET`
//! and friends) are never read. On a developer machine those usually belong
//! to some unrelated tool and would silently authenticate as the wrong app.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::error::IssuerError;
use crate::issuer::AccessToken;
use crate::managed_identity::HostIdentityEndpoint;

const NO_CACHED_SOURCE: usize = usize::MAX;

/// One way of obtaining a token on a developer machine.
#[derive(Debug, Clone)]
pub enum LocalSource {
    HostIdentity(HostIdentityEndpoint),
    AzureCli,
    AzureDeveloperCli,
}

impl LocalSource {
    pub fn name(&self) -> &'static str {
        match self {
            LocalSource::HostIdentity(_) => "host_identity",
            LocalSource::AzureCli => "azure_cli",
            LocalSource::AzureDeveloperCli => "azure_developer_cli",
        }
    }

    async fn acquire(
        &self,
        http: &reqwest::Client,
        scopes: &[String],
    ) -> Result<AccessToken, IssuerError> {
        match self {
            LocalSource::HostIdentity(endpoint) => {
                if !endpoint.is_reachable().await {
                    return Err(IssuerError::Failed(format!(
                        "{} endpoint not reachable",
                        endpoint.label()
                    )));
                }
                endpoint.fetch(http, scopes, None).await
            }
            LocalSource::AzureCli => {
                let mut args = vec!["account", "get-access-token"];
                for scope in scopes {
                    args.extend(["--scope", scope.as_str()]);
                }
                args.extend(["--output", "json"]);
                let stdout = run_cli("az", &args).await?;
                parse_azure_cli_output(&stdout)
            }
            LocalSource::AzureDeveloperCli => {
                let mut args = vec!["auth", "token"];
                for scope in scopes {
                    args.extend(["--scope", scope.as_str()]);
                }
                args.extend(["--output", "json"]);
                let stdout = run_cli("azd", &args).await?;
                parse_azd_output(&stdout)
            }
        }
    }
}

/// Ordered chain of local sources.
pub struct LocalCredentialChain {
    http: reqwest::Client,
    sources: Vec<LocalSource>,
    cached_source: AtomicUsize,
}

impl LocalCredentialChain {
    /// Chain with the default source order.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_sources(
            http,
            vec![
                LocalSource::HostIdentity(HostIdentityEndpoint::imds()),
                LocalSource::AzureCli,
                LocalSource::AzureDeveloperCli,
            ],
        )
    }

    pub fn with_sources(http: reqwest::Client, sources: Vec<LocalSource>) -> Self {
        Self {
            http,
            sources,
            cached_source: AtomicUsize::new(NO_CACHED_SOURCE),
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(LocalSource::name).collect()
    }

    /// Acquire from the remembered source, falling back to the full chain.
    pub async fn acquire(&self, scopes: &[String]) -> Result<AccessToken, IssuerError> {
        let mut errors = Vec::new();

        let cached = self.cached_source.load(Ordering::Relaxed);
        if let Some(source) = self.sources.get(cached) {
            match source.acquire(&self.http, scopes).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    debug!(source = source.name(), error = %e, "cached local credential source failed, rescanning chain");
                    self.cached_source.store(NO_CACHED_SOURCE, Ordering::Relaxed);
                    errors.push(format!("{}: {e}", source.name()));
                }
            }
        }

        for (index, source) in self.sources.iter().enumerate() {
            if index == cached {
                continue;
            }
            match source.acquire(&self.http, scopes).await {
                Ok(token) => {
                    debug!(source = source.name(), "local credential chain authenticated");
                    self.cached_source.store(index, Ordering::Relaxed);
                    return Ok(token);
                }
                Err(e) => {
                    trace!(source = source.name(), error = %e, "local credential source failed");
                    errors.push(format!("{}: {e}", source.name()));
                }
            }
        }

        Err(IssuerError::Failed(format!(
            "all local credential sources failed: {}",
            errors.join("; ")
        )))
    }
}

/// Run a CLI and return stdout. The child is killed if the caller gives up.
async fn run_cli(program: &str, args: &[&str]) -> Result<Vec<u8>, IssuerError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| IssuerError::Failed(format!("failed to run `{program}`: {e} (is it installed?)")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IssuerError::Failed(format!(
            "`{program}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCliToken {
    access_token: String,
    /// Unix seconds; only present in newer CLI releases
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    expires_on: Option<OffsetDateTime>,
}

/// Parse `az account get-access-token --output json`.
pub fn parse_azure_cli_output(stdout: &[u8]) -> Result<AccessToken, IssuerError> {
    let token: AzureCliToken = serde_json::from_slice(stdout)
        .map_err(|e| IssuerError::Failed(format!("unreadable `az` output: {e}")))?;
    let expires_on = token
        .expires_on
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
    Ok(AccessToken::new(token.access_token, expires_on))
}

/// Parse `azd auth token --output json`.
pub fn parse_azd_output(stdout: &[u8]) -> Result<AccessToken, IssuerError> {
    let token: AzdToken = serde_json::from_slice(stdout)
        .map_err(|e| IssuerError::Failed(format!("unreadable `azd` output: {e}")))?;
    Ok(AccessToken::new(token.token, token.expires_on))
}
