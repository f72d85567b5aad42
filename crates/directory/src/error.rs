//! Error types for directory operations

/// Errors from the identity directory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("directory returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous application: {0}")]
    AmbiguousApplication(String),

    #[error("credential creation failed: {0}")]
    CredentialCreationFailed(String),

    #[error("principal resolution failed: {0}")]
    PrincipalResolutionFailed(String),

    #[error("directory credential unavailable: {0}")]
    Credential(String),

    #[error("invalid directory response: {0}")]
    InvalidResponse(String),
}

/// Result alias for directory operations.
pub type Result<T> = std::result::Result<T, Error>;
