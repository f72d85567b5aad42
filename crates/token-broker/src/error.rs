//! Error types for token acquisition

/// Broker-level failures.
///
/// Consent is deliberately absent: a delegated resource that needs the user to
/// re-authorize comes back as `TokenOutcome::ConsentRequired`, not as an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("token acquisition failed: {0}")]
    TokenAcquisitionFailed(String),
}

/// Result alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a token issuer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IssuerError {
    /// The provider wants the user back in the loop (consent, MFA, sign-in).
    #[error("user interaction required: {0}")]
    InteractionRequired(String),

    #[error("token request failed: {0}")]
    Failed(String),
}
