//! Error types for the crate.
//!
//! `GrabError` is the primary error type. It is built with `thiserror` and
//! covers every failure a caller can branch on:
//!
//! - **`Device`**: a device could not be created, opened or enumerated.
//! - **`NotFound`**: a named camera is absent from the last enumeration.
//! - **`Timeout`**: a bounded wait expired. Inside the acquisition loop a
//!   retrieval timeout is a value, not an error; this variant is only surfaced
//!   by caller-side waits such as `Session::wait_until_idle`.
//! - **`State`**: an operation was requested in the wrong lifecycle state
//!   (grabbing on a closed session, grabbing twice). The boolean `grab()`
//!   treats these as silent no-ops.
//! - **`Backend`**: a raw failure reported by the camera backend adapter.
//! - **`Config`**: configuration failed to load or validate.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, GrabError>;

/// Crate-wide error.
#[derive(Error, Debug)]
pub enum GrabError {
    /// A device could not be created, opened or started
    #[error("Device error: {0}")]
    Device(String),

    /// No enumerated camera has this name
    #[error("Camera not found: '{0}'")]
    NotFound(String),

    /// A wait did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The operation is not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    State(#[from] StateError),

    /// The camera backend reported a failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration loading or validation failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GrabError {
    /// True for lifecycle-state errors that the boolean API swallows.
    pub fn is_state(&self) -> bool {
        matches!(self, GrabError::State(_))
    }
}

/// Lifecycle-state violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// No device is bound
    #[error("session is not open")]
    NotOpen,

    /// A grab is already in progress
    #[error("acquisition is already running")]
    AlreadyRunning,
}

/// Failures reported by a camera backend adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The SDK is not initialized
    #[error("SDK not initialized")]
    NotInitialized,

    /// The device is not open
    #[error("device is not open")]
    NotOpen,

    /// No device matches the request
    #[error("no device available")]
    NoDevice,

    /// No node with this name
    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    /// The node is read-only or unavailable
    #[error("node '{0}' is not writable")]
    NodeNotWritable(String),

    /// The value does not fit the node's type, range or entries
    #[error("invalid value for node '{node}': {reason}")]
    InvalidNodeValue {
        /// Node name
        node: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Vendor SDK error code
    #[error("SDK error {code}: {message}")]
    Sdk {
        /// Vendor status code
        code: i32,
        /// Vendor description
        message: String,
    },
}

impl BackendError {
    /// Shorthand for an SDK-level failure.
    pub fn sdk(code: i32, message: impl Into<String>) -> Self {
        BackendError::Sdk {
            code,
            message: message.into(),
        }
    }
}
