//! Concrete transports.
//!
//! Each backend implements [`crate::port::Transport`] and hands the engine
//! a [`crate::port::LinkStream`] on connect:
//!
//! - [`serial`]: tty hardware through the `serialport` crate
//! - [`device`]: raw device files, optionally configured via `stty`
//! - [`file`]: replayed byte sources and captured output, for tests
//! - [`tcp`]: outbound connections and an accepting server
//! - [`rs485`]: half-duplex echo discipline layered over any port

pub mod device;
pub mod file;
pub mod rs485;
pub mod serial;
pub mod tcp;

pub use device::{DeviceTransport, SttyMode};
pub use file::FileTransport;
pub use rs485::Rs485Port;
pub use serial::{
    enumerate_ports, DataBits, FlowControl, LineParams, Parity, PortInfo, SerialTransport,
    StopBits, STANDARD_BAUD_RATES,
};
pub use tcp::{AcceptedTcp, TcpClientTransport, TcpServer};
