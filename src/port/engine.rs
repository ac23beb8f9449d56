//! The port engine.
//!
//! [`Port`] owns a transport, and while open, the link it produced plus the
//! pushback buffer and monitor queues layered over it. All blocking-style
//! operations (waits, sentinel scans, pattern skips) live here and are
//! written once against [`LinkStream`], so every transport gets the same
//! semantics.
//!
//! Reads are layered: the pushback buffer is always served before the live
//! link, while monitor queues record at the link boundary so each wire byte
//! shows up exactly once no matter how often it is unread and re-read.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use memchr::memchr;
use tracing::{debug, trace, warn};

use super::error::PortError;
use super::monitor::{MonitorBinding, MonitorMode, MonitorQueue};
use super::pushback::PushbackBuffer;
use super::scan::{PatternScanner, ScanResult, ScanStep};
use super::settings::PortSettings;
use super::traits::{LinkStream, Transport};

/// Poll interval for availability waits and drain passes.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pause used by the chunked sentinel scans when the link is dry, giving
/// slow devices a chance to fill the buffer before the next bulk read.
const REFILL_PAUSE: Duration = Duration::from_millis(100);

/// Scratch size for drain passes.
const DRAIN_CHUNK: usize = 512;

/// Live state that exists only while the port is open.
#[derive(Debug)]
struct OpenLink {
    link: Box<dyn LinkStream>,
    pushback: PushbackBuffer,
    monitor: MonitorBinding,
}

/// A communication endpoint over some transport.
///
/// A port is created closed. [`Port::open`] asks the transport for a link;
/// [`Port::close`] drops it but keeps the transport so the port can be
/// reopened. Dropping an open port closes it.
///
/// All operations are synchronous and run on the calling thread. Waits poll
/// the link rather than parking on OS readiness, which keeps the engine
/// identical across serial devices, sockets, and files.
///
/// # Examples
///
/// ```
/// use commport::{MockTransport, Port};
///
/// let mock = MockTransport::new("dev0");
/// mock.feed(b"*READY*payload");
///
/// let mut port = Port::new(mock);
/// port.open()?;
/// assert!(port.skip_until(b"*READY*")?);
/// assert_eq!(port.read_exact_bytes(7)?, b"payload");
/// port.close();
/// # Ok::<(), commport::PortError>(())
/// ```
#[derive(Debug)]
pub struct Port<T: Transport> {
    transport: T,
    settings: PortSettings,
    open: Option<OpenLink>,
}

impl<T: Transport> Port<T> {
    /// Create a closed port with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_settings(transport, PortSettings::default())
    }

    /// Create a closed port with the given settings.
    pub fn with_settings(transport: T, settings: PortSettings) -> Self {
        Self {
            transport,
            settings,
            open: None,
        }
    }

    /// The port's current settings.
    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    /// Borrow the transport, e.g. to inspect its target.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport, e.g. to adjust line parameters while
    /// the port is closed.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Set the deadline used by the implicit-timeout waits.
    ///
    /// Takes effect immediately for the engine's own waits. A backend's
    /// native read timeout is applied at open time, so an already-open
    /// link keeps its old read timeout until the port is reopened.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.settings.timeout = timeout;
    }

    /// [`Port::set_timeout`] in milliseconds.
    pub fn set_timeout_millis(&mut self, millis: u64) {
        self.set_timeout(Duration::from_millis(millis));
    }

    /// Set the pushback capacity used the next time the port opens.
    /// The buffer of an already-open port is left untouched.
    pub fn set_pushback_capacity(&mut self, capacity: usize) {
        self.settings.pushback_capacity = capacity;
    }

    /// Set the monitor wiring used the next time the port opens.
    pub fn set_monitor(&mut self, monitor: MonitorMode) {
        self.settings.monitor = monitor;
    }

    /// Set the label used in log output.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.settings.label = Some(label.into());
    }

    fn label(&self) -> String {
        self.settings
            .label
            .clone()
            .unwrap_or_else(|| self.transport.label())
    }

    /// Connect the transport and bring the port up.
    ///
    /// Fails with [`PortError::AlreadyOpen`] if the port is already open;
    /// transport failures propagate and leave the port closed.
    pub fn open(&mut self) -> Result<(), PortError> {
        if self.open.is_some() {
            return Err(PortError::AlreadyOpen);
        }
        let link = self.transport.connect(&self.settings)?;
        debug!(port = %self.label(), link = %link.name(), "port opened");
        self.open = Some(OpenLink {
            link,
            pushback: PushbackBuffer::with_capacity(self.settings.pushback_capacity),
            monitor: MonitorBinding::resolve(&self.settings.monitor),
        });
        Ok(())
    }

    /// Close the port, dropping the link, the pushback buffer, and the
    /// port's monitor wiring. Idempotent: closing a closed port is a no-op.
    pub fn close(&mut self) {
        if let Some(mut open) = self.open.take() {
            if let Err(err) = open.link.flush() {
                trace!(port = %self.label(), error = %err, "flush during close failed");
            }
            debug!(port = %self.label(), "port closed");
        }
    }

    /// Whether the port is open and its link still looks usable.
    ///
    /// A link that reports itself dead (e.g. a TCP peer that closed) is
    /// closed here, so the port returns to a cleanly reopenable state.
    pub fn is_open(&mut self) -> bool {
        let healthy = match &mut self.open {
            Some(open) => open.link.is_healthy(),
            None => return false,
        };
        if !healthy {
            warn!(port = %self.label(), "link no longer usable, closing port");
            self.close();
        }
        healthy
    }

    /// Queue observing received bytes, when monitoring is active and the
    /// port is open.
    pub fn rx_monitor(&self) -> Option<MonitorQueue> {
        self.open.as_ref().and_then(|open| open.monitor.rx.clone())
    }

    /// Queue observing transmitted bytes, when monitoring is active and the
    /// port is open.
    pub fn tx_monitor(&self) -> Option<MonitorQueue> {
        self.open.as_ref().and_then(|open| open.monitor.tx.clone())
    }

    fn open_mut(&mut self) -> Result<&mut OpenLink, PortError> {
        self.open.as_mut().ok_or(PortError::NotOpen)
    }

    // --- availability and waits ---

    /// Number of bytes readable right now without blocking: buffered
    /// pushback plus whatever the link reports ready.
    pub fn available(&mut self) -> Result<usize, PortError> {
        let open = self.open_mut()?;
        Ok(open.pushback.len() + open.link.available()?)
    }

    /// Wait until at least `count` bytes are available or `timeout` passes.
    ///
    /// Returns `Ok(true)` as soon as the threshold is met (checked before
    /// any sleep, so already-satisfied waits return immediately) and
    /// `Ok(false)` on expiry. Polls every 10ms.
    pub fn wait_for_available(&mut self, count: usize, timeout: Duration) -> Result<bool, PortError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.available()? >= count {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!(port = %self.label(), count, ?timeout, "availability wait expired");
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Wait for `count` available bytes under the port's configured timeout,
    /// failing with [`PortError::WaitTimeout`] on expiry.
    pub fn require_available(&mut self, count: usize) -> Result<(), PortError> {
        let timeout = self.settings.timeout;
        if self.wait_for_available(count, timeout)? {
            Ok(())
        } else {
            Err(PortError::wait_timeout(timeout))
        }
    }

    // --- reads ---

    /// One blocking byte; `Ok(None)` at end-of-stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, PortError> {
        let open = self.open_mut()?;
        if let Some(byte) = open.pushback.pop() {
            return Ok(Some(byte));
        }
        let mut byte = [0u8; 1];
        match open.link.read(&mut byte)? {
            0 => Ok(None),
            _ => {
                open.monitor.record_rx(&byte);
                Ok(Some(byte[0]))
            }
        }
    }

    /// Blocking read serving the pushback buffer first.
    ///
    /// When pushback bytes exist, only those are returned (no link read is
    /// mixed into the same call). Otherwise performs one blocking link
    /// read. Returns the number of bytes placed in `buf`; `Ok(0)` only at
    /// end-of-stream or for an empty `buf`.
    pub fn read_blocking_into(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let open = self.open_mut()?;
        let buffered = open.pushback.drain_into(buf);
        if buffered > 0 {
            return Ok(buffered);
        }
        let n = open.link.read(buf)?;
        open.monitor.record_rx(&buf[..n]);
        Ok(n)
    }

    /// Move bytes that are ready right now into `buf` without blocking.
    /// Returns how many were moved, possibly zero.
    pub fn read_available_into(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        let mut filled = 0;
        while filled < buf.len() {
            let open = self.open_mut()?;
            filled += open.pushback.drain_into(&mut buf[filled..]);
            if filled >= buf.len() {
                break;
            }
            let ready = open.link.available()?;
            if ready == 0 {
                break;
            }
            let want = ready.min(buf.len() - filled);
            let n = open.link.read(&mut buf[filled..filled + want])?;
            if n == 0 {
                break;
            }
            open.monitor.record_rx(&buf[filled..filled + n]);
            filled += n;
        }
        Ok(filled)
    }

    /// Everything available right now as a fresh vector, possibly empty.
    pub fn read_available(&mut self) -> Result<Vec<u8>, PortError> {
        let ready = self.available()?;
        if ready == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; ready];
        let n = self.read_available_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Exactly `count` bytes, waiting under the port timeout for them to
    /// arrive. Fails with [`PortError::WaitTimeout`] if they don't.
    pub fn read_exact_bytes(&mut self, count: usize) -> Result<Vec<u8>, PortError> {
        self.require_available(count)?;
        let mut buf = vec![0u8; count];
        let mut filled = 0;
        while filled < count {
            let n = self.read_blocking_into(&mut buf[filled..])?;
            if n == 0 {
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "link ended mid-read",
                )));
            }
            filled += n;
        }
        Ok(buf)
    }

    /// One byte, waiting under the port timeout for it to arrive.
    pub fn next_byte(&mut self) -> Result<u8, PortError> {
        self.require_available(1)?;
        match self.read_byte()? {
            Some(byte) => Ok(byte),
            None => Err(PortError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "link ended after reporting data",
            ))),
        }
    }

    /// Everything available right now, decoded as UTF-8 with replacement
    /// for invalid sequences.
    pub fn read_string(&mut self) -> Result<String, PortError> {
        let bytes = self.read_available()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Exactly `count` bytes decoded as UTF-8 with replacement, waiting
    /// under the port timeout.
    pub fn read_string_exact(&mut self, count: usize) -> Result<String, PortError> {
        let bytes = self.read_exact_bytes(count)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    // --- writes ---

    /// Write all of `data`, looping until the link has accepted every byte.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), PortError> {
        let open = self.open_mut()?;
        let mut written = 0;
        while written < data.len() {
            let n = open.link.write(&data[written..])?;
            if n == 0 {
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "link refused further bytes",
                )));
            }
            written += n;
        }
        open.monitor.record_tx(data);
        Ok(())
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.write_bytes(&[byte])
    }

    /// Write the UTF-8 bytes of `text`.
    pub fn write_str(&mut self, text: &str) -> Result<(), PortError> {
        self.write_bytes(text.as_bytes())
    }

    /// Push backend-side output buffering onto the wire.
    pub fn flush_tx(&mut self) -> Result<(), PortError> {
        self.open_mut()?.link.flush()
    }

    // --- pushback ---

    /// Make `data` the next bytes any read will see, ahead of earlier
    /// unreads and live link data. Order within `data` is preserved.
    ///
    /// Fails with [`PortError::PushbackOverflow`] (storing nothing) if the
    /// buffer cannot hold all of `data`.
    pub fn unread_bytes(&mut self, data: &[u8]) -> Result<(), PortError> {
        self.open_mut()?.pushback.unread(data)
    }

    /// Unread a single byte.
    pub fn unread_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.unread_bytes(&[byte])
    }

    /// Unread the UTF-8 bytes of `text`.
    pub fn unread_str(&mut self, text: &str) -> Result<(), PortError> {
        self.unread_bytes(text.as_bytes())
    }

    // --- sentinel and pattern scans ---

    /// Consume bytes until `pattern` has been read in full.
    ///
    /// Returns `Ok(true)` once matched, with the stream positioned just
    /// past the pattern's last byte, or `Ok(false)` at end-of-stream. An
    /// empty pattern matches immediately. Blocks with no deadline of its
    /// own; only the transport's native read timeout bounds it.
    ///
    /// Matching restarts naively: after a partial match fails, scanning
    /// resumes from the byte after that candidate's start. The restart
    /// rides the pushback buffer, so the pattern length must fit within
    /// the pushback capacity.
    pub fn skip_until(&mut self, pattern: &[u8]) -> Result<bool, PortError> {
        if pattern.is_empty() {
            return Ok(true);
        }
        let mut scanner = PatternScanner::new(pattern);
        loop {
            let byte = match self.read_byte()? {
                Some(byte) => byte,
                None => {
                    trace!(port = %self.label(), "end of stream before pattern");
                    return Ok(false);
                }
            };
            match scanner.advance(byte) {
                ScanStep::Matched => return Ok(true),
                ScanStep::Continue | ScanStep::Discard => {}
                ScanStep::Restart(rescan) => self.unread_bytes(&rescan)?,
            }
        }
    }

    /// Read and discard until `target` is consumed.
    ///
    /// The count reports how many bytes were discarded ahead of the target
    /// (the target itself is consumed but not counted).
    pub fn discard_until(&mut self, target: u8) -> Result<ScanResult, PortError> {
        let mut discarded = 0;
        loop {
            match self.read_byte()? {
                Some(byte) if byte == target => return Ok(ScanResult::Found(discarded)),
                Some(_) => discarded += 1,
                None => return Ok(ScanResult::EndOfStream(discarded)),
            }
        }
    }

    /// Read until `target` is consumed, appending everything ahead of it
    /// to `out`. The count reports the bytes appended.
    pub fn collect_until(&mut self, target: u8, out: &mut Vec<u8>) -> Result<ScanResult, PortError> {
        let mut appended = 0;
        loop {
            match self.read_byte()? {
                Some(byte) if byte == target => return Ok(ScanResult::Found(appended)),
                Some(byte) => {
                    out.push(byte);
                    appended += 1;
                }
                None => return Ok(ScanResult::EndOfStream(appended)),
            }
        }
    }

    /// Bulk-copy into `sink` until `target` has been copied.
    ///
    /// Reads through `chunk` in blocks instead of byte-at-a-time. When the
    /// link is dry the scan pauses 100ms to let data accumulate before the
    /// next bulk read. Bytes read past the target are unread, so the next
    /// read resumes immediately after it. The count reports bytes written
    /// to `sink`, including the target.
    pub fn copy_until<W: Write>(
        &mut self,
        target: u8,
        sink: &mut W,
        chunk: &mut [u8],
    ) -> Result<ScanResult, PortError> {
        if chunk.is_empty() {
            return Err(PortError::invalid("chunk buffer", "empty"));
        }
        let mut written = 0;
        loop {
            if self.available()? == 0 {
                thread::sleep(REFILL_PAUSE);
            }
            let n = self.read_blocking_into(chunk)?;
            if n == 0 {
                return Ok(ScanResult::EndOfStream(written));
            }
            match memchr(target, &chunk[..n]) {
                Some(hit) => {
                    sink.write_all(&chunk[..=hit])?;
                    written += hit + 1;
                    self.unread_bytes(&chunk[hit + 1..n])?;
                    return Ok(ScanResult::Found(written));
                }
                None => {
                    sink.write_all(&chunk[..n])?;
                    written += n;
                }
            }
        }
    }

    /// Fill `buf` in place, starting at `offset`, until `target` has been
    /// stored.
    ///
    /// Same bulk strategy as [`Port::copy_until`]. On `Found` the count is
    /// the filled length including the target, with overshoot unread; on
    /// `EndOfStream` and `BufferFull` it is the filled length. `offset`
    /// past the end of `buf` is rejected with
    /// [`PortError::InvalidParameter`].
    pub fn fill_until(
        &mut self,
        target: u8,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<ScanResult, PortError> {
        if offset > buf.len() {
            return Err(PortError::invalid("offset", offset));
        }
        let mut filled = offset;
        while filled < buf.len() {
            if self.available()? == 0 {
                thread::sleep(REFILL_PAUSE);
            }
            let n = self.read_blocking_into(&mut buf[filled..])?;
            if n == 0 {
                return Ok(ScanResult::EndOfStream(filled));
            }
            match memchr(target, &buf[filled..filled + n]) {
                Some(hit) => {
                    let end = filled + hit + 1;
                    self.unread_bytes(&buf[end..filled + n])?;
                    return Ok(ScanResult::Found(end));
                }
                None => filled += n,
            }
        }
        Ok(ScanResult::BufferFull(buf.len()))
    }

    // --- drains ---

    /// Discard buffered input until the line goes quiet.
    ///
    /// Each pass drains everything currently available (pushback included),
    /// then sleeps 10ms; the drain ends when a pass starts with nothing
    /// available. Returns the total number of bytes discarded.
    pub fn flush_rx(&mut self) -> Result<usize, PortError> {
        let mut total = 0;
        let mut scratch = [0u8; DRAIN_CHUNK];
        loop {
            let ready = self.available()?;
            if ready == 0 {
                if total > 0 {
                    debug!(port = %self.label(), discarded = total, "receive buffer drained");
                }
                return Ok(total);
            }
            let mut remaining = ready;
            while remaining > 0 {
                let want = remaining.min(scratch.len());
                let n = self.read_available_into(&mut scratch[..want])?;
                if n == 0 {
                    break;
                }
                total += n;
                remaining -= n;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait under the port timeout for `count` bytes, then drain as
    /// [`Port::flush_rx`]. For devices that preface their real output with
    /// a known amount of noise.
    pub fn flush_rx_after(&mut self, count: usize) -> Result<usize, PortError> {
        self.require_available(count)?;
        self.flush_rx()
    }
}

impl<T: Transport> Drop for Port<T> {
    fn drop(&mut self) {
        if self.open.is_some() {
            trace!(port = %self.label(), "closing port on drop");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockTransport;

    fn open_port(mock: &MockTransport) -> Port<MockTransport> {
        let mut port = Port::new(mock.clone());
        port.open().unwrap();
        port
    }

    #[test]
    fn test_open_close_lifecycle() {
        let mock = MockTransport::new("mock0");
        let mut port = Port::new(mock);

        assert!(!port.is_open());
        port.open().unwrap();
        assert!(port.is_open());

        port.close();
        assert!(!port.is_open());
        // Closing again is a no-op.
        port.close();

        // A closed port can be reopened.
        port.open().unwrap();
        assert!(port.is_open());
    }

    #[test]
    fn test_double_open_is_an_error() {
        let mock = MockTransport::new("mock0");
        let mut port = open_port(&mock);
        assert!(matches!(port.open(), Err(PortError::AlreadyOpen)));
        // The original link is untouched.
        assert!(port.is_open());
    }

    #[test]
    fn test_operations_on_closed_port_fail() {
        let mock = MockTransport::new("mock0");
        let mut port = Port::new(mock);

        assert!(matches!(port.available(), Err(PortError::NotOpen)));
        assert!(matches!(port.write_byte(0x00), Err(PortError::NotOpen)));
        assert!(matches!(port.unread_byte(0x00), Err(PortError::NotOpen)));
        assert!(matches!(port.flush_tx(), Err(PortError::NotOpen)));
    }

    #[test]
    fn test_read_serves_pushback_before_link() {
        let mock = MockTransport::new("mock0");
        mock.feed(b"link");
        let mut port = open_port(&mock);

        port.unread_bytes(b"pb").unwrap();
        assert_eq!(port.available().unwrap(), 6);

        let mut buf = [0u8; 8];
        // Pushback bytes come alone, not mixed with link data.
        assert_eq!(port.read_blocking_into(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"pb");
        assert_eq!(port.read_blocking_into(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"link");
    }

    #[test]
    fn test_write_records_and_reaches_link() {
        let mock = MockTransport::new("mock0");
        let mut port = open_port(&mock);

        port.write_bytes(b"cmd").unwrap();
        port.write_byte(b'!').unwrap();
        port.write_str(" go").unwrap();
        assert_eq!(mock.written(), b"cmd! go");
    }

    #[test]
    fn test_read_available_takes_snapshot() {
        let mock = MockTransport::new("mock0");
        mock.feed(b"now");
        let mut port = open_port(&mock);

        assert_eq!(port.read_available().unwrap(), b"now");
        // Nothing left: non-blocking read returns empty rather than waiting.
        assert_eq!(port.read_available().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_next_byte_times_out_on_silence() {
        let mock = MockTransport::new("mock0");
        let mut port = open_port(&mock);
        port.set_timeout_millis(50);

        let err = port.next_byte().unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_monitor_queues_live_with_the_open_port() {
        let mock = MockTransport::new("mock0");
        let mut port = Port::new(mock);
        port.set_monitor(MonitorMode::Split);

        assert!(port.rx_monitor().is_none());
        port.open().unwrap();
        assert!(port.rx_monitor().is_some());
        assert!(port.tx_monitor().is_some());

        port.close();
        assert!(port.rx_monitor().is_none());
    }

    #[test]
    fn test_unhealthy_link_self_heals_to_closed() {
        let mock = MockTransport::new("mock0");
        let mut port = open_port(&mock);

        mock.set_healthy(false);
        assert!(!port.is_open());
        // The port is now fully closed and can be reopened.
        mock.set_healthy(true);
        port.open().unwrap();
        assert!(port.is_open());
    }
}
