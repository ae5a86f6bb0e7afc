//! Crate-wide error type
//!
//! Subsystems alias `EngineResult` and add their own context helpers
//! (see `renderer::error`).

use std::time::Duration;

/// Errors surfaced by the frame pipeline
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    #[error("No compatible GPU adapter found")]
    NoAdapter,

    #[error("GPU device request failed: {0}")]
    DeviceRequest(String),

    #[error("System error in {component}: {error}")]
    SystemError { component: String, error: String },

    #[error("Shader '{name}' failed to load: {error}")]
    ShaderLoadFailed { name: String, error: String },

    #[error("Shader '{name}' failed to reload: {error}")]
    ShaderReloadFailed { name: String, error: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("IO error at {path}: {error}")]
    IoError { path: String, error: String },

    #[error("Failed to parse config {path}: {error}")]
    ConfigParse { path: String, error: String },

    #[error("{resource_type} not found: {id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoError {
            path: "<unknown>".to_string(),
            error: err.to_string(),
        }
    }
}
