//! Error types for CPLD firmware lifecycle operations

use crate::activation::ActivationState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while managing CPLD firmware versions
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// A required argument was empty or malformed
    #[error("Invalid argument {name}: '{value}'")]
    InvalidArgument {
        /// Argument name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// No version with this id is known
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Activation can only start from Ready or Failed
    #[error("Cannot start activating version {id} from {from:?}")]
    InvalidTransition {
        /// Version id
        id: String,
        /// State the version was in
        from: ActivationState,
    },

    /// A release file did not yield a version string
    #[error("No version found in release file: {}", .0.display())]
    EmptyVersion(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unit manager call failed
    #[error("Unit manager error: {0}")]
    UnitManager(String),

    /// Object bus call failed
    #[error("Bus error: {0}")]
    Bus(String),

    /// Filesystem watch could not be established
    #[error("Watch error: {0}")]
    Watch(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl UpdaterError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a unit manager error.
    #[must_use]
    pub fn unit_manager(msg: impl Into<String>) -> Self {
        Self::UnitManager(msg.into())
    }

    /// Create a bus error.
    #[must_use]
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }
}

impl From<notify::Error> for UpdaterError {
    fn from(e: notify::Error) -> Self {
        UpdaterError::Watch(e.to_string())
    }
}

/// A specialized `Result` type for CPLD firmware lifecycle operations.
pub type UpdaterResult<T> = Result<T, UpdaterError>;
