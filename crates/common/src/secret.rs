//! Redacting wrapper for client secrets and bearer tokens

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop.
///
/// Client secret material and access tokens travel through the broker in this
/// wrapper so a stray `?secret` in a tracing field cannot leak them.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True when the wrapped string is empty or only whitespace.
    ///
    /// A blank static secret in configuration counts as "not configured".
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_secret_is_redacted_in_debug_and_display() {
        let secret = Secret::new(String::from("abc~secretText.123"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
    }

    #[test]
    fn expose_returns_material() {
        let secret: Secret<String> = "abc~secretText.123".into();
        assert_eq!(secret.expose(), "abc~secretText.123");
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(Secret::from("").is_blank());
        assert!(Secret::from("  \n").is_blank());
        assert!(!Secret::from("x").is_blank());
    }

    #[test]
    fn redaction_survives_nested_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Holder {
            token: Secret<String>,
        }
        let holder = Holder {
            token: Secret::from("eyJ0eXAiOiJKV1QiLCJhbGciOi"),
        };
        let debug = format!("{holder:?}");
        assert!(!debug.contains("eyJ0eXAi"), "got: {debug}");
    }
}
