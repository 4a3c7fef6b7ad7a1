//! Error types for vproute

use crate::feature::FeatureKind;
use thiserror::Error;

/// Result type alias for vproute operations
pub type Result<T> = std::result::Result<T, Error>;

/// vproute error type
#[derive(Error, Debug)]
pub enum Error {
    // Resolution errors
    #[error("Invalid feature combination: {0}")]
    InvalidCombination(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    // Pipe errors
    #[error("Feature {0} already present in layer")]
    DuplicateFeature(FeatureKind),

    #[error("Layer {index} out of range ({count} layers)")]
    LayerOutOfRange { index: usize, count: usize },

    #[error("Invalid pipe: {0}")]
    InvalidPipe(String),

    // Stream errors
    #[error("Frame stream closed: {0}")]
    StreamClosed(String),

    // General errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the caller may retry with a simpler request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidCombination(_) | Error::CapacityExceeded(_)
        )
    }

    /// Check if this is a hardware capability issue
    pub fn is_capability_issue(&self) -> bool {
        matches!(
            self,
            Error::InvalidCombination(_) | Error::Unimplemented(_) | Error::CapacityExceeded(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidCombination(msg.into())
    }

    pub(crate) fn pipe(msg: impl Into<String>) -> Self {
        Error::InvalidPipe(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::invalid("x").is_recoverable());
        assert!(Error::CapacityExceeded("x".into()).is_capability_issue());
        assert!(!Error::DuplicateFeature(FeatureKind::Csc).is_recoverable());
        assert!(!Error::Config("bad".into()).is_capability_issue());
        assert!(!Error::StreamClosed("x".into()).is_recoverable());
        assert!(!Error::MissingCollaborator("x".into()).is_capability_issue());
    }

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateFeature(FeatureKind::Scaling);
        assert_eq!(err.to_string(), "Feature scaling already present in layer");
        let err = Error::LayerOutOfRange { index: 3, count: 2 };
        assert_eq!(err.to_string(), "Layer 3 out of range (2 layers)");
    }
}
