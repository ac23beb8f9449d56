//! Core traits for the port abstraction.
//!
//! `Transport` is a way of reaching an endpoint; `LinkStream` is the raw
//! byte link it produces when connected. Real backends (serial, device
//! files, TCP, plain files) and the scripted mock implement both, so the
//! engine in [`super::engine`] can be driven identically against hardware
//! and in tests.

use super::error::PortError;
use super::settings::PortSettings;

/// Raw bidirectional byte link supplied by a transport.
///
/// Reads block, bounded only by whatever read timeout the backend itself
/// carries; `Ok(0)` means end-of-stream, never "no data yet". Backends
/// whose timeout fires mid-read surface that as an error instead.
pub trait LinkStream: Send + std::fmt::Debug {
    /// Blocking read into `buf`. Returns the number of bytes read;
    /// `Ok(0)` only at end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError>;

    /// Write from `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Push any backend-side output buffering onto the wire.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Number of bytes that can be read right now without blocking.
    fn available(&mut self) -> Result<usize, PortError>;

    /// Identifier for log output (device path, peer address, file name).
    fn name(&self) -> &str;

    /// Whether the link still looks usable.
    ///
    /// Defaults to yes; TCP overrides this with a peer-close probe so a
    /// port can notice a vanished peer without attempting a read.
    fn is_healthy(&mut self) -> bool {
        true
    }
}

/// A way of producing a connected [`LinkStream`].
///
/// The transport value outlives the link: closing a port drops the link but
/// keeps the transport, so the same port can be reopened with the same
/// target and parameters.
pub trait Transport: Send + std::fmt::Debug {
    /// Establish the link.
    ///
    /// `settings` carries the port timeout; backends with a native read
    /// timeout apply it to the link's blocking reads.
    fn connect(&mut self, settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError>;

    /// Human-readable target description for log output.
    fn label(&self) -> String;
}

/// Type-erased transport, for ports whose backend is chosen at runtime.
pub type BoxedTransport = Box<dyn Transport>;

impl Transport for BoxedTransport {
    fn connect(&mut self, settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        (**self).connect(settings)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}
