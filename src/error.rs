//! Error types for interpose.

/// A fault raised by a target method or by an aspect hook.
///
/// This is the "exception" carried through a [`ReturnMessage`](crate::ReturnMessage).
/// Aspects may wrap it with context or replace it outright.
pub type Fault = anyhow::Error;

/// The single error a caller of an intercepted method observes.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("Pre-call hook {aspect} (priority {priority}) failed: {source}")]
    PreCall {
        aspect: String,
        priority: i32,
        #[source]
        source: Fault,
    },

    #[error("Post-call hook {aspect} (priority {priority}) failed: {source}")]
    PostCall {
        aspect: String,
        priority: i32,
        #[source]
        source: Fault,
    },

    #[error(transparent)]
    Raised(Fault),
}

impl InterceptError {
    /// Returns the underlying fault.
    pub fn into_fault(self) -> Fault {
        match self {
            InterceptError::PreCall { source, .. } | InterceptError::PostCall { source, .. } => {
                source
            }
            InterceptError::Raised(fault) => fault,
        }
    }

    /// Borrow the underlying fault.
    pub fn fault(&self) -> &Fault {
        match self {
            InterceptError::PreCall { source, .. } | InterceptError::PostCall { source, .. } => {
                source
            }
            InterceptError::Raised(fault) => fault,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
