//! Error handling for the SDF engine
//!
//! Only configuration, resource allocation and buffer contract failures are
//! errors. Numerical approximation and transient "not ready yet" states are
//! handled in place and never surface here.

use thiserror::Error;

/// Main error type for the SDF engine
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration Errors
    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // Buffer Errors
    #[error("Buffer creation failed: size={size}, usage={usage}")]
    BufferCreationFailed { size: u64, usage: String },

    #[error("Buffer access out of bounds: offset {offset} + {len} > size {size}")]
    BufferAccess { offset: u64, len: u64, size: u64 },

    #[error("Buffer '{label}' was not created host-readable")]
    BufferNotReadable { label: String },

    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    #[error("GPU device not found")]
    DeviceNotFound,

    // Resource Errors
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Resource not found: {resource_type} '{id}'")]
    ResourceNotFound { resource_type: String, id: String },

    // Threading Errors
    #[error("Channel closed: {name}")]
    ChannelClosed { name: String },

    #[error("Thread '{name}' failed: {error}")]
    ThreadFailed { name: String, error: String },
}

/// Type alias for Results in the SDF engine
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<crossbeam_channel::RecvError> for EngineError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        EngineError::ChannelClosed {
            name: "crossbeam".to_string(),
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError,
    {
        self.ok_or_else(f)
    }
}
