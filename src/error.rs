//! Error types for the devicegate service.

use thiserror::Error;

use crate::identity::InvalidDeviceId;

/// Main error type for devicegate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// A device id failed validation on an explicit validate/reset call
    #[error("Invalid device id: {0}")]
    FormatInvalid(#[from] InvalidDeviceId),

    /// A device id is required but none of the accepted headers carried a valid one
    #[error("Device identification required; send one of: {}", accepted_headers.join(", "))]
    RequiredIdentityMissing {
        /// Header names that are accepted, in priority order
        accepted_headers: Vec<String>,
    },

    /// Unexpected fault while touching the counter store
    #[error("Counter store fault: {0}")]
    InternalStoreFault(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for devicegate operations.
pub type Result<T> = std::result::Result<T, GateError>;
