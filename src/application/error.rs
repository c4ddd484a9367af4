use thiserror::Error;

use crate::application::options::UnsupportedOptionsError;
use crate::application::repos::{SinkError, StoreError};
use crate::domain::error::DomainError;
use crate::domain::types::NodeId;

#[derive(Debug, Error)]
pub enum RenditionError {
    #[error("async transforms and renditions are disabled")]
    ServiceDisabled,
    #[error("{label}: source node {node} does not exist")]
    SourceNotFound { label: String, node: NodeId },
    #[error("rendition `{name}` has not been registered")]
    UnknownRendition { name: String },
    #[error("{label} is not supported: {reason}")]
    UnsupportedTransform { label: String, reason: String },
    #[error("{label} has already been created")]
    AlreadyUpToDate { label: String },
    #[error("node {node} cannot be renditioned as it is of class `{content_class}`")]
    Prevented { node: NodeId, content_class: String },
    #[error("dispatch route mismatch: {message}")]
    Routing { message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] SinkError),
    #[error(transparent)]
    UnsupportedOptions(#[from] UnsupportedOptionsError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RenditionError {
    pub fn unsupported(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedTransform {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Conflicts are the only errors a fresh transaction can cure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenditionError::Store(StoreError::Conflict { .. }))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, RenditionError::UnsupportedTransform { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = RenditionError::from(StoreError::Conflict {
            node: NodeId::new(),
        });
        assert!(conflict.is_retryable());
        assert!(!RenditionError::ServiceDisabled.is_retryable());
        assert!(!RenditionError::from(StoreError::Persistence("disk".into())).is_retryable());
    }

    #[test]
    fn unsupported_message_names_the_request() {
        let err = RenditionError::unsupported("Rendition doclib", "no transformer");
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "Rendition doclib is not supported: no transformer"
        );
    }
}
