//! Forge API error types.
//!
//! Errors distinguish transient from permanent failures so callers can decide
//! whether an in-place retry may help:
//!
//! - **Transient**: 5xx, rate limits, timeouts, connection problems
//! - **Permanent**: everything else (missing objects, missing permissions)

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::retry::Retriable;

/// The kind of forge error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeErrorKind {
    Transient,
    Permanent,
}

/// A forge API error.
#[derive(Debug, Error)]
pub struct ForgeError {
    pub kind: ForgeErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    pub message: String,

    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "forge API error (HTTP {}): {}", code, self.message),
            None => write!(f, "forge API error: {}", self.message),
        }
    }
}

impl ForgeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ForgeErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ForgeErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// A call did not finish within its time bound.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::transient(format!("{} timed out after {:?}", operation, after))
    }

    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ForgeErrorKind::Transient
    }
}

impl Retriable for ForgeError {
    fn is_transient(&self) -> bool {
        ForgeError::is_transient(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_when_known() {
        let err = ForgeError::permanent("not found").with_status(404);
        assert_eq!(err.to_string(), "forge API error (HTTP 404): not found");
        assert_eq!(
            ForgeError::transient("reset").to_string(),
            "forge API error: reset"
        );
    }

    #[test]
    fn timeouts_are_transient() {
        let err = ForgeError::timeout("set_commit_status", Duration::from_secs(30));
        assert!(err.is_transient());
        assert!(err.message.contains("set_commit_status"));
    }
}
