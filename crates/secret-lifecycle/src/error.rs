//! Error types for secret rotation

/// Errors from the secret lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("ambiguous application: {0}")]
    AmbiguousApplication(String),

    #[error("credential creation failed: {0}")]
    CredentialCreationFailed(String),

    #[error("principal resolution failed: {0}")]
    PrincipalResolutionFailed(String),

    #[error("directory error: {0}")]
    Directory(String),
}

/// Result alias for secret lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<directory::Error> for Error {
    fn from(err: directory::Error) -> Self {
        match err {
            directory::Error::NotFound(msg) => Error::ApplicationNotFound(msg),
            directory::Error::AmbiguousApplication(msg) => Error::AmbiguousApplication(msg),
            directory::Error::CredentialCreationFailed(msg) => Error::CredentialCreationFailed(msg),
            directory::Error::PrincipalResolutionFailed(msg) => {
                Error::PrincipalResolutionFailed(msg)
            }
            other => Error::Directory(other.to_string()),
        }
    }
}
