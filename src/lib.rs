//! Communication ports with pushback, pattern waits, and traffic monitoring.
//!
//! One blocking [`Port`] engine drives interchangeable transports: serial
//! hardware, raw device files, TCP clients and servers, and replayed files.
//! The engine layers a bounded pushback buffer and optional monitor queues
//! over the raw link, and provides the wait/scan vocabulary that
//! device-protocol code actually needs: wait for N bytes, skip until a
//! pattern, collect up to a sentinel, drain a noisy line.
//!
//! # Modules
//!
//! - `port`: the engine, its traits, errors, and the scripted mock
//! - `transport`: serial, device-file, file-replay, TCP, and RS-485 backends
//! - `config`: TOML configuration with environment overrides
//!
//! # Example
//!
//! ```no_run
//! use commport::{LineParams, Port, SerialTransport};
//!
//! # fn main() -> Result<(), commport::PortError> {
//! let transport = SerialTransport::new("/dev/ttyUSB0", LineParams::with_baud(115200))?;
//! let mut port = Port::new(transport);
//! port.set_timeout_millis(2000);
//! port.open()?;
//!
//! port.write_str("*IDN?\n")?;
//! if port.skip_until(b"IDN:")? {
//!     let mut ident = Vec::new();
//!     port.collect_until(b'\n', &mut ident)?;
//!     println!("device: {}", String::from_utf8_lossy(&ident));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod port;
pub mod transport;

// Re-export commonly used types for convenience
pub use port::{
    BoxedTransport, Direction, LinkStream, MockTransport, MonitorEntry, MonitorMode, MonitorQueue,
    Port, PortError, PortSettings, PushbackBuffer, ScanResult, Transport,
};
pub use transport::{
    enumerate_ports, AcceptedTcp, DataBits, DeviceTransport, FileTransport, FlowControl,
    LineParams, Parity, PortInfo, Rs485Port, SerialTransport, StopBits, SttyMode,
    TcpClientTransport, TcpServer, STANDARD_BAUD_RATES,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
