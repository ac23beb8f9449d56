//! Sentinel and pattern scanning support for the port engine.

/// Outcome of a sentinel-byte scan.
///
/// What the count measures depends on the operation: bytes discarded,
/// bytes appended or written, or the filled length of a caller buffer. Each
/// operation documents its own meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// The target byte was seen and consumed.
    Found(usize),
    /// The link reported end-of-stream before the target byte appeared.
    EndOfStream(usize),
    /// The destination buffer filled up before the target byte appeared.
    /// Only in-place fills can report this.
    BufferFull(usize),
}

impl ScanResult {
    /// True when the target byte was actually seen.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The operation's byte count, whatever the outcome.
    pub fn count(&self) -> usize {
        match *self {
            Self::Found(n) | Self::EndOfStream(n) | Self::BufferFull(n) => n,
        }
    }
}

/// Outcome of feeding one byte to a [`PatternScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanStep {
    /// The byte completed the pattern.
    Matched,
    /// The byte extended a partial match (or started one); feed the next.
    Continue,
    /// The byte broke a partial match. The candidate's first byte is gone
    /// for good; the carried bytes must be unread and rescanned so a match
    /// starting inside the failed candidate is not missed.
    Restart(Vec<u8>),
    /// Plain non-matching byte with no partial match pending; discard it.
    Discard,
}

/// Byte-at-a-time matcher using naive restart.
///
/// On a mismatch after a partial match, scanning resumes from the byte after
/// the candidate's start rather than consulting a partial-match table. The
/// engine feeds the `Restart` bytes back through the pushback buffer, which
/// keeps the matcher itself stateless across restarts and still finds the
/// first occurrence of self-overlapping patterns.
///
/// The pattern must be non-empty; callers treat an empty pattern as an
/// immediate match and never construct a scanner for it.
#[derive(Debug)]
pub(crate) struct PatternScanner<'p> {
    pattern: &'p [u8],
    window: Vec<u8>,
}

impl<'p> PatternScanner<'p> {
    pub fn new(pattern: &'p [u8]) -> Self {
        debug_assert!(!pattern.is_empty());
        Self {
            pattern,
            window: Vec::with_capacity(pattern.len()),
        }
    }

    pub fn advance(&mut self, byte: u8) -> ScanStep {
        if byte == self.pattern[self.window.len()] {
            self.window.push(byte);
            if self.window.len() == self.pattern.len() {
                ScanStep::Matched
            } else {
                ScanStep::Continue
            }
        } else if self.window.is_empty() {
            ScanStep::Discard
        } else {
            let mut rescan = self.window.split_off(1);
            self.window.clear();
            rescan.push(byte);
            ScanStep::Restart(rescan)
        }
    }
}
