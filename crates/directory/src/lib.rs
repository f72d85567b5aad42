//! Identity directory capability
//!
//! The secret lifecycle only needs five things from the remote directory:
//! who is calling, which application object a public client id maps to, and
//! list/add/remove of password credentials on that object. `DirectoryClient`
//! captures exactly that surface so the lifecycle crate can be driven by an
//! in-memory stub in tests and by `GraphDirectoryClient` in production.
//!
//! Every call is a single awaited request. Dropping the returned future
//! cancels the in-flight HTTP request.

pub mod claims;
pub mod error;
pub mod graph;
pub mod types;

pub use error::{Error, Result};
pub use graph::{GraphCredential, GraphDirectoryClient};
pub use types::{Principal, SecretRecord};

use std::future::Future;
use std::pin::Pin;
use time::OffsetDateTime;

/// Boxed future returned by directory trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote identity directory operations consumed by the secret lifecycle.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn DirectoryClient>`).
pub trait DirectoryClient: Send + Sync {
    /// Resolve the internal object id for a public client (app) id.
    ///
    /// Fails with `NotFound` on zero matches and `AmbiguousApplication` when
    /// the directory returns more than one object for the same client id.
    fn resolve_object_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, Result<String>>;

    /// List every password credential on the application object.
    fn list_secrets<'a>(&'a self, object_id: &'a str) -> BoxFuture<'a, Result<Vec<SecretRecord>>>;

    /// Attach a new password credential. The returned record carries the
    /// secret material; `CredentialCreationFailed` if the directory omits it.
    fn add_secret<'a>(
        &'a self,
        object_id: &'a str,
        display_name: &'a str,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'a, Result<SecretRecord>>;

    /// Remove a password credential by key id.
    fn remove_secret<'a>(&'a self, object_id: &'a str, key_id: &'a str)
    -> BoxFuture<'a, Result<()>>;

    /// Resolve the principal behind the currently active identity.
    fn resolve_current_principal(&self) -> BoxFuture<'_, Result<Principal>>;
}
