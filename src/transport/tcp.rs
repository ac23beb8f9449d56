//! TCP transports: outbound client and accepting server.
//!
//! The port timeout doubles as the socket read timeout, so the blocking
//! primitives are bounded on a silent peer. Availability and health are
//! probed with non-blocking peeks, which also lets a port notice an
//! orderly peer shutdown without consuming data.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::port::engine::Port;
use crate::port::error::PortError;
use crate::port::settings::PortSettings;
use crate::port::traits::{LinkStream, Transport};

/// Poll interval while waiting for an inbound connection.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Peek buffer size; bounds what `available` can report in one probe.
const PROBE_CAPACITY: usize = 64 * 1024;

/// Apply the standard socket options to a connected stream.
///
/// A zero port timeout means "no read timeout" (`set_read_timeout` rejects
/// a zero duration outright).
fn configure_stream(stream: &TcpStream, timeout: Duration) -> Result<(), PortError> {
    stream.set_nonblocking(false)?;
    if timeout > Duration::ZERO {
        stream.set_read_timeout(Some(timeout))?;
    } else {
        stream.set_read_timeout(None)?;
    }
    stream.set_nodelay(true)?;
    Ok(())
}

/// Transport dialing out to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpClientTransport {
    addr: String,
}

impl TcpClientTransport {
    /// Create a transport that connects to `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// The address this transport dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Transport for TcpClientTransport {
    fn connect(&mut self, settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        let stream = TcpStream::connect(&self.addr)?;
        configure_stream(&stream, settings.timeout)?;
        let peer = stream.peer_addr()?;
        debug!(addr = %self.addr, %peer, "tcp connection established");
        Ok(Box::new(TcpLink::new(stream, peer)))
    }

    fn label(&self) -> String {
        format!("tcp:{}", self.addr)
    }
}

/// Listening socket that hands out connected [`Port`]s.
///
/// The listener itself is not a port: it accepts connections, and each
/// accepted connection becomes an independent, already-open port over an
/// [`AcceptedTcp`] transport.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    local: SocketAddr,
}

impl TcpServer {
    /// Bind a listener on `addr`. Port 0 picks an ephemeral port;
    /// [`TcpServer::local_addr`] reports what was actually bound.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, PortError> {
        let listener = TcpListener::bind(addr)?;
        // Accepts are implemented as a poll loop, same as the engine's
        // waits, so the listener runs non-blocking.
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        debug!(%local, "tcp server listening");
        Ok(Self { listener, local })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Wait up to `wait` for an inbound connection.
    ///
    /// Returns an open port over the accepted connection, carrying the
    /// given settings, or `Ok(None)` if nobody connected in time. Polls
    /// every 10ms.
    pub fn accept_within(
        &self,
        wait: Duration,
        settings: PortSettings,
    ) -> Result<Option<Port<AcceptedTcp>>, PortError> {
        let deadline = Instant::now() + wait;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(local = %self.local, %peer, "inbound tcp connection accepted");
                    let mut port = Port::with_settings(AcceptedTcp::new(stream, peer), settings);
                    port.open()?;
                    return Ok(Some(port));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(ACCEPT_POLL.min(deadline - now));
                }
                Err(e) => return Err(PortError::Io(e)),
            }
        }
    }
}

/// Transport wrapping one accepted connection.
///
/// Single-shot by nature: the connection exists only once, so after a
/// close the port cannot be reopened. Dial back with a
/// [`TcpClientTransport`] if the conversation should continue.
#[derive(Debug)]
pub struct AcceptedTcp {
    peer: SocketAddr,
    stream: Option<TcpStream>,
}

impl AcceptedTcp {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            peer,
            stream: Some(stream),
        }
    }

    /// The remote end of the accepted connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for AcceptedTcp {
    fn connect(&mut self, settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        let stream = self.stream.take().ok_or_else(|| {
            PortError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "an accepted connection cannot be reopened",
            ))
        })?;
        // The accepted socket may inherit the listener's non-blocking flag;
        // configure_stream puts it back into blocking mode.
        configure_stream(&stream, settings.timeout)?;
        Ok(Box::new(TcpLink::new(stream, self.peer)))
    }

    fn label(&self) -> String {
        format!("tcp-accept:{}", self.peer)
    }
}

/// Live TCP connection, for both dialed and accepted sockets.
struct TcpLink {
    stream: TcpStream,
    peer: String,
    probe: Vec<u8>,
}

impl TcpLink {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer: peer.to_string(),
            probe: vec![0; PROBE_CAPACITY],
        }
    }
}

impl LinkStream for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            // A tripped SO_RCVTIMEO reads as WouldBlock on some platforms;
            // normalize so callers see one timeout kind.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(PortError::Io(
                io::Error::new(io::ErrorKind::TimedOut, e),
            )),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(self.stream.flush()?)
    }

    fn available(&mut self) -> Result<usize, PortError> {
        self.stream.set_nonblocking(true)?;
        let peeked = self.stream.peek(&mut self.probe);
        self.stream.set_nonblocking(false)?;
        match peeked {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.peer
    }

    fn is_healthy(&mut self) -> bool {
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut probe = [0u8; 1];
        let peeked = self.stream.peek(&mut probe);
        if self.stream.set_nonblocking(false).is_err() {
            return false;
        }
        match peeked {
            // A zero-byte peek is the peer's orderly shutdown.
            Ok(0) => false,
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for TcpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLink").field("peer", &self.peer).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_reports_ephemeral_port() {
        let server = TcpServer::bind("127.0.0.1:0").unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn test_accept_within_times_out_without_client() {
        let server = TcpServer::bind("127.0.0.1:0").unwrap();
        let start = Instant::now();
        let accepted = server
            .accept_within(Duration::from_millis(60), PortSettings::default())
            .unwrap();
        assert!(accepted.is_none());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_accepted_connection_is_single_shot() {
        let server = TcpServer::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(server.local_addr()).unwrap();

        let mut port = server
            .accept_within(Duration::from_millis(500), PortSettings::default())
            .unwrap()
            .expect("client should have been accepted");
        assert!(port.is_open());

        port.close();
        let err = port.open().unwrap_err();
        assert!(matches!(err, PortError::Io(_)));
    }

    #[test]
    fn test_client_connect_to_closed_port_fails() {
        // Bind-then-drop guarantees the port is closed when we dial it.
        let addr = {
            let server = TcpServer::bind("127.0.0.1:0").unwrap();
            server.local_addr()
        };
        let mut transport = TcpClientTransport::new(addr.to_string());
        assert!(transport.connect(&PortSettings::default()).is_err());
    }
}
