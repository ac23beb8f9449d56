//! Bounded pushback buffer.
//!
//! Lets previously-read bytes be "unread" so the next read sees them again
//! before any fresh link data. The pattern scanner leans on this to restart
//! after a failed partial match, and protocol code uses it to hand back
//! overshoot from chunked reads.

use std::collections::VecDeque;

use super::error::PortError;

/// Fixed-capacity prefix buffer served ahead of the live link.
///
/// Unreads prepend: the most recently unread batch is read back first, while
/// bytes within one batch keep their order. Exceeding the capacity fails the
/// whole unread and leaves the buffer untouched.
#[derive(Debug)]
pub struct PushbackBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl PushbackBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Prepend `data` ahead of everything buffered so far.
    ///
    /// All-or-nothing: if `data` would push the buffer past its capacity,
    /// nothing is stored and `PushbackOverflow` is returned.
    pub fn unread(&mut self, data: &[u8]) -> Result<(), PortError> {
        if self.bytes.len() + data.len() > self.capacity {
            return Err(PortError::PushbackOverflow {
                capacity: self.capacity,
            });
        }
        for &byte in data.iter().rev() {
            self.bytes.push_front(byte);
        }
        Ok(())
    }

    /// Take the frontmost byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    /// Move up to `buf.len()` buffered bytes into `buf`, front first.
    ///
    /// Returns how many were moved; zero when the buffer is empty.
    pub fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut moved = 0;
        while moved < buf.len() {
            match self.bytes.pop_front() {
                Some(byte) => {
                    buf[moved] = byte;
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_then_pop_preserves_order() {
        let mut buf = PushbackBuffer::with_capacity(16);
        buf.unread(b"abc").unwrap();

        assert_eq!(buf.pop(), Some(b'a'));
        assert_eq!(buf.pop(), Some(b'b'));
        assert_eq!(buf.pop(), Some(b'c'));
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_latest_unread_is_served_first() {
        let mut buf = PushbackBuffer::with_capacity(16);
        buf.unread(b"later").unwrap();
        buf.unread(b"now").unwrap();

        let mut out = [0u8; 8];
        let n = buf.drain_into(&mut out);
        assert_eq!(&out[..n], b"nowlater");
    }

    #[test]
    fn test_overflow_rejected_without_partial_write() {
        let mut buf = PushbackBuffer::with_capacity(4);
        buf.unread(b"ab").unwrap();

        let err = buf.unread(b"cde").unwrap_err();
        assert!(matches!(err, PortError::PushbackOverflow { capacity: 4 }));

        // The failed unread must not have stored anything.
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.pop(), Some(b'a'));
    }

    #[test]
    fn test_fill_to_exact_capacity() {
        let mut buf = PushbackBuffer::with_capacity(3);
        buf.unread(b"xyz").unwrap();
        assert_eq!(buf.len(), 3);
        assert!(buf.unread(b"!").is_err());
    }

    #[test]
    fn test_drain_into_short_buffer() {
        let mut buf = PushbackBuffer::with_capacity(16);
        buf.unread(b"hello").unwrap();

        let mut out = [0u8; 2];
        assert_eq!(buf.drain_into(&mut out), 2);
        assert_eq!(&out, b"he");
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut buf = PushbackBuffer::with_capacity(16);
        buf.unread(b"data").unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_empty_unread_is_noop() {
        let mut buf = PushbackBuffer::with_capacity(0);
        buf.unread(b"").unwrap();
        assert!(buf.is_empty());
    }
}
