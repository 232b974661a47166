//! Common error types for FinServe
//!
//! This module defines all error types used across the FinServe server.
//! Per-request errors carry a client-safe rendering so internal causes
//! never leak onto the wire.

use std::net::AddrParseError;
use thiserror::Error;

/// Main error type for FinServe
#[derive(Error, Debug)]
pub enum FinserveError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model artifact loading errors
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Memory mapping errors
    #[error("Memory mapping error: {0}")]
    MemoryMap(String),

    /// Feature vector length does not match the model input size
    #[error("shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch {
        /// Input size declared by the model
        expected: usize,
        /// Length of the submitted feature vector
        actual: usize,
    },

    /// Model execution errors during a forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// Request body could not be decoded into a feature vector
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Server at connection capacity (backpressure)
    #[error("server overloaded: {0}")]
    Overloaded(String),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AddrParseError> for FinserveError {
    fn from(err: AddrParseError) -> Self {
        FinserveError::Parse(err.to_string())
    }
}

impl FinserveError {
    /// Render this error for the response body sent to a client.
    ///
    /// Request-scoped errors (malformed body, shape mismatch, timeout,
    /// overload) are descriptive; everything else collapses to a generic
    /// message and the detailed cause stays in the server log.
    pub fn client_message(&self) -> String {
        match self {
            FinserveError::MalformedRequest(_)
            | FinserveError::ShapeMismatch { .. }
            | FinserveError::Overloaded(_) => self.to_string(),
            FinserveError::Timeout(msg) => format!("timed out: {}", msg),
            _ => "inference failed".to_string(),
        }
    }

    /// True for errors that abort startup rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FinserveError::Config(_) | FinserveError::ModelLoad(_) | FinserveError::MemoryMap(_)
        )
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        FinserveError::Config(msg.into())
    }

    /// Create a model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        FinserveError::ModelLoad(msg.into())
    }

    /// Create a memory mapping error
    pub fn memory_map(msg: impl Into<String>) -> Self {
        FinserveError::MemoryMap(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        FinserveError::Inference(msg.into())
    }

    /// Create a malformed request error
    pub fn malformed(msg: impl Into<String>) -> Self {
        FinserveError::MalformedRequest(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        FinserveError::Timeout(msg.into())
    }

    /// Create an overloaded error
    pub fn overloaded(msg: impl Into<String>) -> Self {
        FinserveError::Overloaded(msg.into())
    }
}

/// Result type alias for FinServe operations
pub type Result<T> = std::result::Result<T, FinserveError>;
