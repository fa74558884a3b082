use thiserror::Error;

use crate::cx::CxError;
use crate::key::Key;

/// Error type accepted from user hooks (`init`, loaders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, NotifierError>;

/// Structural and programmer errors. Business-logic failures of async loads
/// never surface here; they are captured in the async state instead.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Invalid Reference Structure Detected: key `{key}` is already registered")]
    DuplicateKey { key: Key },

    #[error("Invalid Reference Structure Detected: `{key}` cannot relate to `{related}`: {issue}")]
    InvalidRelated {
        key: Key,
        related: Key,
        issue: RelatedIssue,
    },

    #[error("initialization of `{type_name}` (key `{key}`) failed: {source}")]
    Init {
        key: Key,
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error(
        "`{operation}` requires a context, but none is registered for `{key}` and no global context is set"
    )]
    MissingContext { operation: String, key: Key },

    #[error(transparent)]
    Cancelled(#[from] CxError),
}

/// Why a `related` entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelatedIssue {
    #[error("a container cannot relate to itself")]
    SelfReference,
    #[error("related container is not registered")]
    NotRegistered,
    #[error("related container is listed more than once")]
    Duplicate,
}

impl NotifierError {
    #[must_use]
    pub fn missing_context(operation: impl Into<String>, key: Key) -> Self {
        Self::MissingContext {
            operation: operation.into(),
            key,
        }
    }

    /// Key the error refers to, when there is one.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::DuplicateKey { key }
            | Self::InvalidRelated { key, .. }
            | Self::Init { key, .. }
            | Self::MissingContext { key, .. } => Some(key),
            Self::Cancelled(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_names_the_structure_error() {
        let err = NotifierError::DuplicateKey {
            key: Key::named("A"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid Reference Structure Detected"));
        assert!(msg.contains("`A`"));
    }

    #[test]
    fn missing_context_names_operation() {
        let err = NotifierError::missing_context("load profile", Key::named("profile"));
        let msg = err.to_string();
        assert!(msg.contains("load profile"));
        assert!(msg.contains("profile"));
        assert_eq!(err.key(), Some(&Key::named("profile")));
    }

    #[test]
    fn init_error_keeps_source() {
        let err = NotifierError::Init {
            key: Key::named("vm"),
            type_name: "CounterVm",
            source: "boom".into(),
        };
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn cancelled_converts_from_cx_error() {
        let err: NotifierError = CxError::Cancelled.into();
        assert_eq!(err.to_string(), "context cancelled");
        assert!(err.key().is_none());
    }
}
