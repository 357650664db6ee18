//! Error types for berth.

use thiserror::Error;

/// A shared error type for the whole berth workspace.
///
/// Variants follow the failure taxonomy of the orchestrator: storage failures,
/// unknown entities, missing model assets, unmet prompt-processing
/// preconditions and failures in the middle of a generation stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BerthError {
    /// Entity not found error with type information
    #[error("{entity_type} '{id}' not found")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// A required model asset has never been downloaded.
    #[error("asset '{asset}' with URL '{url}' cannot be found locally")]
    AssetMissing { asset: String, url: String },

    /// The model's container is not running.
    #[error("model '{model_id}' is not running")]
    ModelNotRunning { model_id: String },

    /// The container runs but the liveness probe has not succeeded yet.
    #[error("model '{model_id}' is running but not answering yet")]
    ModelNotAnswering { model_id: String },

    /// No reachable address was reported for a running model.
    #[error("missing address for model '{model_id}'")]
    MissingAddress { model_id: String },

    /// Failure in the middle of a streaming generation.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Container runtime failure reported by the gateway.
    #[error("Container error: {0}")]
    Container(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input supplied by a caller.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BerthError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a Stream error
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Creates a Container error
    pub fn container(message: impl Into<String>) -> Self {
        Self::Container(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Check if this is a serialization error
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Returns true for the errors that leave a prompt `Errored` because the
    /// model was not ready to take work.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ModelNotRunning { .. } | Self::ModelNotAnswering { .. } | Self::MissingAddress { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for BerthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for BerthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for BerthError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for BerthError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, BerthError>`.
pub type Result<T> = std::result::Result<T, BerthError>;
