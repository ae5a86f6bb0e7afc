//! Renderer subsystem error handling
//!
//! Type aliases and helpers so renderer code can propagate foreign errors
//! with `?` instead of unwrapping.

use crate::error::{EngineError, EngineResult};

/// Type alias for renderer operation results
pub type RendererResult<T> = EngineResult<T>;

/// Helper trait for renderer error contexts
pub trait RendererErrorContext<T> {
    fn renderer_context(self, context: &str) -> RendererResult<T>;
}

impl<T, E> RendererErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn renderer_context(self, context: &str) -> RendererResult<T> {
        self.map_err(|e| EngineError::SystemError {
            component: "renderer".to_string(),
            error: format!("{}: {}", context, e),
        })
    }
}

impl<T> RendererErrorContext<T> for Option<T> {
    fn renderer_context(self, context: &str) -> RendererResult<T> {
        self.ok_or_else(|| EngineError::ResourceNotFound {
            resource_type: "renderer".to_string(),
            id: context.to_string(),
        })
    }
}

/// Create a GPU operation error
pub fn gpu_operation_error(operation: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::GpuOperationFailed {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}

/// Create a shader load error
pub fn shader_load_error(shader: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::ShaderLoadFailed {
        name: shader.to_string(),
        error: error.to_string(),
    }
}

/// Create a shader reload error
pub fn shader_reload_error(shader: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::ShaderReloadFailed {
        name: shader.to_string(),
        error: error.to_string(),
    }
}
