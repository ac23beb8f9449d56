//! Scripted mock transport for testing.
//!
//! Provides a `MockTransport` that simulates a device on the far end of a
//! link without requiring actual hardware. Supports immediate and delayed
//! data feeds, end-of-stream, write capture, half-duplex echo, and failure
//! injection.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::error::PortError;
use super::settings::PortSettings;
use super::traits::{LinkStream, Transport};

/// A feed scheduled to become readable at a point in time.
#[derive(Debug)]
struct TimedFeed {
    at: Instant,
    bytes: Vec<u8>,
}

/// Inner state shared between the transport handle and its links.
#[derive(Debug, Default)]
struct MockState {
    /// Feeds not yet due for release.
    pending: VecDeque<TimedFeed>,
    /// Bytes readable right now.
    ready: VecDeque<u8>,
    /// Flat capture of every byte written.
    written: Vec<u8>,
    /// Per-call capture of writes.
    write_log: Vec<Vec<u8>>,
    /// After the queues drain, reads report end-of-stream.
    eof: bool,
    /// Writes are looped back into the read queue.
    echo: bool,
    /// Reported by the link's health probe.
    healthy: bool,
    /// The next read or write fails with a timeout error.
    should_timeout: bool,
    /// The next connect fails.
    fail_connect: bool,
    /// How many times the transport has connected.
    connects: usize,
}

impl MockState {
    /// Move feeds whose release time has passed into the ready queue.
    fn release_due(&mut self) {
        let now = Instant::now();
        let mut still_pending = VecDeque::new();
        while let Some(feed) = self.pending.pop_front() {
            if feed.at <= now {
                self.ready.extend(feed.bytes);
            } else {
                still_pending.push_back(feed);
            }
        }
        self.pending = still_pending;
    }
}

/// Scripted transport simulating a remote device.
///
/// The transport is `Clone`, and all clones share the same state: keep one
/// handle for scripting and assertions, move its clone into the port. The
/// scripting methods therefore take `&self` and can be called while the
/// port owns the other handle.
///
/// Reads block until data is released, end-of-stream is scripted, or a
/// scripted failure fires, matching the real-transport contract.
///
/// # Example
/// ```
/// use commport::{MockTransport, Port};
///
/// let mock = MockTransport::new("MOCK0");
/// mock.feed(b"pong");
///
/// let mut port = Port::new(mock.clone());
/// port.open()?;
/// port.write_bytes(b"ping")?;
/// assert_eq!(port.read_exact_bytes(4)?, b"pong");
/// assert_eq!(mock.written(), b"ping");
/// # Ok::<(), commport::PortError>(())
/// ```
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                healthy: true,
                ..Default::default()
            })),
        }
    }

    /// Make `data` readable immediately.
    pub fn feed(&self, data: &[u8]) {
        self.state.lock().ready.extend(data.iter().copied());
    }

    /// Make `data` readable once `delay` has elapsed from now.
    pub fn feed_after(&self, delay: Duration, data: &[u8]) {
        self.state.lock().pending.push_back(TimedFeed {
            at: Instant::now() + delay,
            bytes: data.to_vec(),
        });
    }

    /// After all fed data is consumed, reads report end-of-stream instead
    /// of blocking.
    pub fn end_of_stream(&self) {
        self.state.lock().eof = true;
    }

    /// Loop every write back into the read queue, like a half-duplex line
    /// that hears its own transmissions.
    pub fn echo_writes(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Control what the link's health probe reports.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = healthy;
    }

    /// Make the next read or write fail with a timeout I/O error.
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    /// Make the next connect fail.
    pub fn fail_next_connect(&self) {
        self.state.lock().fail_connect = true;
    }

    /// Every byte written so far, flattened across calls.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Captured writes, one entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Forget all captured writes.
    pub fn clear_written(&self) {
        let mut state = self.state.lock();
        state.written.clear();
        state.write_log.clear();
    }

    /// Bytes currently readable without blocking.
    pub fn ready_len(&self) -> usize {
        let mut state = self.state.lock();
        state.release_due();
        state.ready.len()
    }

    /// How many times the transport has connected.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            state.fail_connect = false;
            return Err(PortError::not_found(&self.name));
        }
        state.connects += 1;
        drop(state);
        Ok(Box::new(MockLink {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("ready_len", &self.ready_len())
            .finish()
    }
}

/// Link half of the mock, handed to the port on connect.
struct MockLink {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl LinkStream for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut state = self.state.lock();
                state.release_due();
                if state.should_timeout {
                    state.should_timeout = false;
                    return Err(PortError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "scripted read timeout",
                    )));
                }
                if !state.ready.is_empty() {
                    let mut n = 0;
                    while n < buf.len() {
                        match state.ready.pop_front() {
                            Some(byte) => {
                                buf[n] = byte;
                                n += 1;
                            }
                            None => break,
                        }
                    }
                    return Ok(n);
                }
                if state.eof && state.pending.is_empty() {
                    return Ok(0);
                }
            }
            // Nothing ready yet and more is scripted (or possible): block
            // like a real link would.
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "scripted write timeout",
            )));
        }
        state.written.extend_from_slice(data);
        state.write_log.push(data.to_vec());
        if state.echo {
            state.ready.extend(data.iter().copied());
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        state.release_due();
        Ok(state.ready.len())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_healthy(&mut self) -> bool {
        self.state.lock().healthy
    }
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink").field("name", &self.name).finish()
    }
}
