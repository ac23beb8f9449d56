//! Port-specific error types.
//!
//! One taxonomy for everything the port layer can fail with, from line
//! parameter validation through live I/O. End-of-stream is deliberately NOT
//! an error: scan and wait operations report it through their return values
//! so callers are forced to check the outcome.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring or driving a port.
#[derive(Debug, Error)]
pub enum PortError {
    /// A wait with an implicit deadline exceeded the port's configured timeout.
    ///
    /// This is the expected "device stayed silent" condition; callers
    /// typically retry or report it, unlike the hard I/O variants below.
    #[error("Wait timed out after {waited:?}")]
    WaitTimeout { waited: Duration },

    /// A configuration parameter was outside its legal set.
    #[error("Invalid {param}: {value}")]
    InvalidParameter { param: &'static str, value: String },

    /// The named port or device does not exist on this system.
    #[error("Port not found: {0}")]
    NotFound(String),

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// Unreading more bytes than the pushback buffer can hold.
    #[error("Pushback buffer overflow (capacity {capacity} bytes)")]
    PushbackOverflow { capacity: usize },

    /// A half-duplex echo readback did not match what was sent.
    #[error("Echo mismatch at byte {offset}: sent {sent:#04x}, echoed {echoed:#04x}")]
    EchoMismatch { offset: usize, sent: u8, echoed: u8 },

    /// An I/O error from the underlying link.
    ///
    /// Transport-level read timeouts surface here when a no-deadline blocking
    /// primitive runs into the backend's own read timeout.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport backend error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create an InvalidParameter error from a parameter name and the
    /// offending value.
    pub fn invalid(param: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            param,
            value: value.to_string(),
        }
    }

    /// Create a WaitTimeout error from the duration that elapsed.
    pub fn wait_timeout(waited: Duration) -> Self {
        Self::WaitTimeout { waited }
    }

    /// True for the recoverable "device stayed silent" condition.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. })
    }
}
