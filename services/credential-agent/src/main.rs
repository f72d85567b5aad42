//! Credential agent
//!
//! Single-binary service that:
//! 1. Resolves the application client secret (static, or freshly rotated for
//!    the current principal)
//! 2. Pre-warms delegated tokens so consent problems surface at startup
//! 3. Serves short-lived access tokens for the configured resources over HTTP

mod config;
mod graph_credential;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use directory::GraphDirectoryClient;
use metrics_exporter_prometheus::PrometheusHandle;
use secret_lifecycle::RuntimeCredentialResolver;
use token_broker::{
    CredentialSelector, DeploymentEnvironment, EntraTokenIssuer, Error as BrokerError,
    HostIdentityEndpoint, TokenBroker, TokenOutcome,
};

use crate::config::Config;
use crate::graph_credential::BrokerGraphCredential;

/// How long in-flight requests may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    broker: Arc<TokenBroker>,
    prometheus: PrometheusHandle,
    started_at: Instant,
    timeout: Duration,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/token/{resource}", get(token_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Everything the service wires together from configuration.
struct Components {
    issuer: Arc<EntraTokenIssuer>,
    broker: Arc<TokenBroker>,
    resolver: RuntimeCredentialResolver,
}

fn build_components(config: &Config) -> Result<Components> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let mut issuer = EntraTokenIssuer::new(
        http.clone(),
        &config.application.tenant_id,
        &config.application.client_id,
    );
    if config.environment.mode == DeploymentEnvironment::Hosted {
        let endpoint = HostIdentityEndpoint::detect();
        info!(endpoint = endpoint.label(), "using host identity endpoint");
        issuer = issuer.with_host_identity(endpoint);
    }
    let issuer = Arc::new(issuer);

    let selector = CredentialSelector::new(
        config.environment.mode,
        config.environment.identity_client_id.clone(),
        issuer.clone(),
    );
    let broker = Arc::new(TokenBroker::new(config.catalog()?, selector));

    if let Some(session) = config.session() {
        info!(account = %session.account, "interactive session loaded");
        broker.set_session(Some(session));
    }

    let credential = Arc::new(BrokerGraphCredential::new(
        broker.clone(),
        &config.directory.graph_resource,
    ));
    let directory = Arc::new(GraphDirectoryClient::new(
        http,
        &config.directory.graph_url,
        credential,
    ));
    let resolver = RuntimeCredentialResolver::new(
        &config.application.client_id,
        config.application.static_secret.clone(),
        directory,
    );

    Ok(Components {
        issuer,
        broker,
        resolver,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting credential-agent");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        environment = config.environment.mode.as_str(),
        resources = config.resources.len(),
        static_secret = config.application.static_secret.is_some(),
        session = config.application.session_token.is_some(),
        "configuration loaded"
    );

    let components = build_components(&config)?;

    let secret = components
        .resolver
        .ensure_secret()
        .await
        .context("failed to resolve application client secret")?;
    components.issuer.set_client_secret(secret);

    components.broker.prewarm_all().await;

    let app_state = AppState {
        broker: components.broker,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
        timeout: Duration::from_secs(config.server.timeout_secs),
    };
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus the resources this agent can serve.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "resources": state.broker.catalog().names(),
    });
    metrics::record_request("health", 200);

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Issue a fresh token for one named resource.
async fn token_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());

    let result = tokio::time::timeout(state.timeout, state.broker.get_token(&resource)).await;

    let (status, body) = match result {
        Ok(Ok(TokenOutcome::Acquired(token))) => {
            info!(request_id = %request_id, resource = %resource, "token issued");
            let expires_on = token.expires_on.and_then(|t| t.format(&Rfc3339).ok());
            (
                StatusCode::OK,
                serde_json::json!({
                    "access_token": token.value.expose(),
                    "expires_on": expires_on,
                }),
            )
        }
        Ok(Ok(TokenOutcome::ConsentRequired(challenge))) => {
            warn!(request_id = %request_id, resource = %resource, "user consent required");
            (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({
                    "error": "consent_required",
                    "resource": challenge.resource,
                    "scopes": challenge.scopes,
                    "message": challenge.reason,
                }),
            )
        }
        Ok(Err(e)) => {
            let (status, code) = match &e {
                BrokerError::UnknownResource(_) => (StatusCode::NOT_FOUND, "unknown_resource"),
                BrokerError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                }
                BrokerError::TokenAcquisitionFailed(_) => {
                    (StatusCode::BAD_GATEWAY, "token_acquisition_failed")
                }
            };
            warn!(request_id = %request_id, resource = %resource, error = %e, "token request failed");
            (
                status,
                serde_json::json!({ "error": code, "message": e.to_string() }),
            )
        }
        Err(_) => {
            warn!(
                request_id = %request_id,
                resource = %resource,
                timeout_secs = state.timeout.as_secs(),
                "token request timed out"
            );
            (
                StatusCode::GATEWAY_TIMEOUT,
                serde_json::json!({ "error": "timeout", "message": "token request timed out" }),
            )
        }
    };

    metrics::record_request("token", status.as_u16());
    (
        status,
        [
            (axum::http::header::CONTENT_TYPE, "application/json".to_string()),
            (
                axum::http::header::HeaderName::from_static("x-request-id"),
                request_id,
            ),
        ],
        body.to_string(),
    )
        .into_response()
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
