//! Error types for tracebacker
//!
//! Instrumentation degrades silently on everything the instrumented program
//! can cause (empty pops, disabled recording, unknown names). The variants
//! here cover wiring mistakes made by whoever integrates the library.

#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

use crate::thread::ThreadKey;

/// Result type alias for tracebacker operations
pub type Result<T> = std::result::Result<T, TracebackerError>;

/// Unified error type for all tracebacker operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TracebackerError {
    /// A thread tried to register a second call stack while its first
    /// handle is still alive.
    #[error("Call stack already registered for thread {0}")]
    AlreadyRegistered(ThreadKey),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TracebackerError {
    /// Returns true if this error comes from integration wiring rather
    /// than from runtime data.
    pub fn is_wiring_error(&self) -> bool {
        matches!(
            self,
            TracebackerError::AlreadyRegistered(_) | TracebackerError::Configuration(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<TracebackerError> for PyErr {
    fn from(err: TracebackerError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}

impl From<serde_json::Error> for TracebackerError {
    fn from(err: serde_json::Error) -> Self {
        TracebackerError::Serialization(err.to_string())
    }
}
