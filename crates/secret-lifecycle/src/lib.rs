//! Application secret lifecycle
//!
//! Mints short-lived client secrets on a registered application, one set per
//! acting principal, and cleans up that principal's previous secrets first.
//! Secrets from other principals, and secrets this system did not create, are
//! never touched: ownership is decided purely by the display-name convention
//! in [`naming`].

pub mod error;
pub mod manager;
pub mod naming;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use manager::{CleanupReport, Clock, SecretLifecycleManager};
pub use resolver::{ROTATION_EXPIRATION_HOURS, RuntimeCredentialResolver};
