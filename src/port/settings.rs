//! Transport-independent port settings.

use std::time::Duration;

use super::monitor::MonitorMode;

/// Default deadline for waits with an implicit timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the pushback buffer, in bytes.
pub const DEFAULT_PUSHBACK_CAPACITY: usize = 4096;

/// The knobs every port carries regardless of its transport.
///
/// Settings are read at open time; see the individual [`crate::port::Port`]
/// setters for which changes take effect on an already-open port.
#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Label used in log output. Falls back to the transport's own label
    /// when unset.
    pub label: Option<String>,
    /// Deadline for the implicit-timeout waits. Also handed to transports
    /// at open so backends with a native read timeout bound their blocking
    /// reads by it.
    pub timeout: Duration,
    /// Capacity of the pushback buffer created at open.
    pub pushback_capacity: usize,
    /// How traffic is teed into monitor queues, resolved at open.
    pub monitor: MonitorMode,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            label: None,
            timeout: DEFAULT_TIMEOUT,
            pushback_capacity: DEFAULT_PUSHBACK_CAPACITY,
            monitor: MonitorMode::Off,
        }
    }
}

impl PortSettings {
    /// Settings with every knob at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wait deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the wait deadline in milliseconds.
    pub fn with_timeout_millis(mut self, millis: u64) -> Self {
        self.timeout = Duration::from_millis(millis);
        self
    }

    /// Set the pushback buffer capacity.
    pub fn with_pushback_capacity(mut self, capacity: usize) -> Self {
        self.pushback_capacity = capacity;
        self
    }

    /// Set the monitor wiring.
    pub fn with_monitor(mut self, monitor: MonitorMode) -> Self {
        self.monitor = monitor;
        self
    }

    /// Set the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
