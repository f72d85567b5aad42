//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secret material never lives in the TOML: the static client secret comes
//! from `APP_CLIENT_SECRET` or `static_secret_file`, and the user's refresh
//! token from `session_token_file`.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use token_broker::{DeploymentEnvironment, ResourceCatalog, ResourceScope, SessionContext};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub application: ApplicationConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub resources: Vec<ResourceScope>,
}

/// The managed application registration
#[derive(Debug, Deserialize)]
pub struct ApplicationConfig {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(skip)]
    pub static_secret: Option<Secret<String>>,
    /// Path to a file holding a static client secret (alternative to APP_CLIENT_SECRET)
    #[serde(default)]
    pub static_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub session_token: Option<Secret<String>>,
    /// Path to the signed-in user's refresh token, written by the hosting app
    #[serde(default)]
    pub session_token_file: Option<PathBuf>,
    /// Account the session token belongs to (UPN or home account id)
    #[serde(default)]
    pub session_account: Option<String>,
}

/// Account label used in logs when the session's owner is not configured.
const UNKNOWN_ACCOUNT: &str = "unknown";

/// Where the process runs
#[derive(Debug, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_mode")]
    pub mode: DeploymentEnvironment,
    #[serde(default)]
    pub identity_client_id: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            identity_client_id: None,
        }
    }
}

/// Directory service settings
#[derive(Debug, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    /// Resource (from `[[resources]]`) whose token is used for directory calls
    #[serde(default = "default_graph_resource")]
    pub graph_resource: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            graph_url: default_graph_url(),
            graph_resource: default_graph_resource(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_mode() -> DeploymentEnvironment {
    DeploymentEnvironment::Local
}

fn default_graph_url() -> String {
    directory::graph::DEFAULT_GRAPH_URL.to_string()
}

fn default_graph_resource() -> String {
    "graph".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    256
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Static secret resolution order:
    /// 1. APP_CLIENT_SECRET env var
    /// 2. static_secret_file path from config
    ///
    /// MANAGED_IDENTITY_CLIENT_ID overrides `environment.identity_client_id`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(secret) = std::env::var("APP_CLIENT_SECRET") {
            config.application.static_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.application.static_secret_file {
            config.application.static_secret = read_secret_file(secret_file, "static_secret_file")?;
        }
        if config
            .application
            .static_secret
            .as_ref()
            .is_some_and(Secret::is_blank)
        {
            config.application.static_secret = None;
        }

        if let Some(ref token_file) = config.application.session_token_file {
            config.application.session_token = read_secret_file(token_file, "session_token_file")?;
        }

        if let Ok(id) = std::env::var("MANAGED_IDENTITY_CLIENT_ID") {
            config.environment.identity_client_id = Some(id);
        }
        config.environment.identity_client_id = config
            .environment
            .identity_client_id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.application.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "application.client_id must not be empty".into(),
            ));
        }
        if self.application.tenant_id.trim().is_empty() {
            return Err(common::Error::Config(
                "application.tenant_id must not be empty".into(),
            ));
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !self.directory.graph_url.starts_with("http://")
            && !self.directory.graph_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "graph_url must start with http:// or https://, got: {}",
                self.directory.graph_url
            )));
        }

        if self.environment.mode == DeploymentEnvironment::Hosted
            && self.environment.identity_client_id.is_none()
        {
            return Err(common::Error::Config(
                "hosted mode requires environment.identity_client_id or MANAGED_IDENTITY_CLIENT_ID"
                    .into(),
            ));
        }

        let catalog = self.catalog()?;

        // Without a static secret, bootstrap needs the directory.
        if self.application.static_secret.is_none()
            && catalog.get(&self.directory.graph_resource).is_none()
        {
            return Err(common::Error::Config(format!(
                "directory.graph_resource '{}' is not a configured resource",
                self.directory.graph_resource
            )));
        }

        Ok(())
    }

    /// Validated resource catalog.
    /// Interactive session handed over by the hosting application, if any.
    pub fn session(&self) -> Option<SessionContext> {
        let refresh_token = self.application.session_token.clone()?;
        let account = self
            .application
            .session_account
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_ACCOUNT)
            .to_string();
        Some(SessionContext {
            account,
            refresh_token,
        })
    }

    pub fn catalog(&self) -> common::Result<ResourceCatalog> {
        ResourceCatalog::new(self.resources.clone())
            .map_err(|e| common::Error::Config(format!("invalid resources: {e}")))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("credential-agent.toml")
    }
}

/// Read a trimmed secret from `path`; empty files yield `None`.
fn read_secret_file(path: &Path, field: &str) -> common::Result<Option<Secret<String>>> {
    let value = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", path.display()))
    })?;
    let value = value.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}
