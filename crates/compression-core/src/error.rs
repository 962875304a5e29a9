//! Error handling for the compression pipeline
//!
//! Every error here is handled locally by the pipeline; nothing propagates
//! to the packet-delivery caller. The one exception is
//! [`CompressionError::Initialization`], which is surfaced at startup so the
//! owning process can decide whether to run in permanently-disabled mode.

use thiserror::Error;

/// Result type alias for compression operations
pub type Result<T> = std::result::Result<T, CompressionError>;

/// Errors raised by the compression pipeline and its inference client
#[derive(Error, Debug)]
pub enum CompressionError {
    /// Inference service is not ready to take traffic
    #[error("inference service unavailable")]
    Unavailable,

    /// Inference call exceeded its latency bound
    #[error("inference request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Inference service reported a failure
    #[error("inference request failed: {reason}")]
    InferenceFailed { reason: String },

    /// Inference service returned success with internally inconsistent data
    #[error("malformed inference result: {details}")]
    MalformedResult { details: String },

    /// Inference client adapter failed to initialize (fatal at startup)
    #[error("inference client initialization failed: {details}")]
    Initialization { details: String },
}

/// Errors decoding a compression metadata header extension
///
/// A decode failure means the extension is treated as absent; the packet
/// itself is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// Buffer shorter than the fixed extension layout
    #[error("extension too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    /// Unknown wire format version
    #[error("unsupported extension version: {version}")]
    UnsupportedVersion { version: u8 },
}
