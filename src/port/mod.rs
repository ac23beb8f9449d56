//! Port abstraction layer.
//!
//! The engine in [`engine`] drives any [`traits::Transport`] through the
//! same blocking API: availability waits, sentinel and pattern scans,
//! pushback, and traffic monitoring. Real transports live in
//! [`crate::transport`]; the scripted [`mock::MockTransport`] stands in for
//! hardware in tests.

pub mod engine;
pub mod error;
pub mod mock;
pub mod monitor;
pub mod pushback;
pub mod scan;
pub mod settings;
pub mod traits;

pub use engine::Port;
pub use error::PortError;
pub use mock::MockTransport;
pub use monitor::{Direction, MonitorEntry, MonitorMode, MonitorQueue};
pub use pushback::PushbackBuffer;
pub use scan::ScanResult;
pub use settings::{PortSettings, DEFAULT_PUSHBACK_CAPACITY, DEFAULT_TIMEOUT};
pub use traits::{BoxedTransport, LinkStream, Transport};
