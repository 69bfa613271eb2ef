//! Custom error types for the application.
//!
//! This module defines the primary error type, `AttendanceError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures that can occur, from serial link problems to CSV
//! persistence and configuration issues.
//!
//! ## Error Hierarchy
//!
//! - **`ConnectionOpen`**: the serial port could not be opened (bad port name, device
//!   unplugged, permission denied). Fatal to that worker instance, never retried.
//! - **`Read`**: an I/O error mid-stream on an open link. Fatal to that worker instance.
//! - **`Validation`**: a user action was missing required input (e.g. a registration
//!   without a name). Recovered locally; the user is re-prompted.
//! - **`Store`**: reading or writing one of the CSV files failed. The operation is
//!   aborted and in-memory state is preserved.
//! - **`Config`** / **`Configuration`**: parse-level and semantic configuration errors.
//!
//! Nothing in this crate retries automatically. All recovery is user-initiated.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AttendanceError>;

/// Every failure the crate reports.
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// The serial port could not be opened
    #[error("Failed to open port {port}: {reason}")]
    ConnectionOpen {
        /// Port that was requested
        port: String,
        /// Driver error text
        reason: String,
    },

    /// A read from an open port failed
    #[error("Serial error: {0}")]
    Read(String),

    /// User input was rejected; the message is shown as is
    #[error("{0}")]
    Validation(String),

    /// A data file could not be read or written
    #[error("Storage error: {0}")]
    Store(String),

    /// Filesystem or port I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but holds an invalid value
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A reader is already running on this port
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// Built without hardware serial support
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// The consumer of the hand-off queue is gone
    #[error("Hand-off queue closed")]
    QueueClosed,
}

impl AttendanceError {
    /// Whether the user can fix this by retrying the action with different input.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AttendanceError::Validation(_)
            | AttendanceError::AlreadyConnected(_)
            | AttendanceError::ConnectionOpen { .. }
            | AttendanceError::Read(_) => true,
            AttendanceError::Store(_)
            | AttendanceError::Io(_)
            | AttendanceError::Csv(_)
            | AttendanceError::Config(_)
            | AttendanceError::Configuration(_)
            | AttendanceError::SerialFeatureDisabled
            | AttendanceError::QueueClosed => false,
        }
    }

    /// Wraps any displayable failure as a store error, keeping the path in the message.
    pub(crate) fn store(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        AttendanceError::Store(format!("{}: {}", path.display(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_open_message_names_port() {
        let err = AttendanceError::ConnectionOpen {
            port: "/dev/ttyACM0".into(),
            reason: "No such file or directory".into(),
        };
        let message = err.to_string();
        assert!(message.contains("/dev/ttyACM0"), "Error message: {}", message);
        assert!(message.contains("No such file"), "Error message: {}", message);
        assert!(err.is_recoverable());
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = AttendanceError::Validation("Identifier and name are required".into());
        assert_eq!(err.to_string(), "Identifier and name are required");
        assert!(err.is_recoverable());
    }

    #[test]
    fn store_errors_are_not_recoverable() {
        let err = AttendanceError::store(std::path::Path::new("users.csv"), "disk full");
        assert_eq!(err.to_string(), "Storage error: users.csv: disk full");
        assert!(!err.is_recoverable());
    }
}
