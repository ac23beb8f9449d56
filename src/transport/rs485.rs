//! RS-485 half-duplex discipline.
//!
//! On a two-wire RS-485 bus the transceiver hears its own transmissions,
//! so every write comes straight back on the receive side. [`Rs485Port`]
//! wraps any port and consumes that echo after each write, optionally
//! verifying it byte-for-byte against what was sent (a cheap bus-collision
//! and wiring check).

use std::io;
use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::port::engine::Port;
use crate::port::error::PortError;
use crate::port::traits::Transport;

/// Port wrapper that strips (and optionally verifies) the transmit echo.
///
/// Dereferences to the wrapped [`Port`], so every read-side operation is
/// used as normal. The write methods are shadowed with echo-consuming
/// versions; writing through `DerefMut` directly would leave the echo in
/// the receive path, so don't.
///
/// The consumed echo flows through the engine's read path and therefore
/// shows up in the rx monitor queue like any other received bytes.
#[derive(Debug)]
pub struct Rs485Port<T: Transport> {
    port: Port<T>,
    verify_echo: bool,
}

impl<T: Transport> Rs485Port<T> {
    /// Wrap a port, discarding echos without checking them.
    pub fn new(port: Port<T>) -> Self {
        Self {
            port,
            verify_echo: false,
        }
    }

    /// Wrap a port and verify every echo against the bytes sent.
    pub fn with_echo_verification(port: Port<T>) -> Self {
        Self {
            port,
            verify_echo: true,
        }
    }

    /// Turn echo verification on or off.
    pub fn set_verify_echo(&mut self, verify: bool) {
        self.verify_echo = verify;
    }

    /// Whether echos are verified against the sent bytes.
    pub fn verify_echo(&self) -> bool {
        self.verify_echo
    }

    /// Unwrap back into the plain port.
    pub fn into_inner(self) -> Port<T> {
        self.port
    }

    /// Write all of `data`, then read the same number of echo bytes back
    /// off the line.
    ///
    /// With verification on, a divergent echo fails with
    /// [`PortError::EchoMismatch`]; the whole echo has been consumed either
    /// way, so the receive path stays aligned.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), PortError> {
        self.port.write_bytes(data)?;
        self.consume_echo(data)
    }

    /// Write a single byte and consume its echo.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.write_bytes(&[byte])
    }

    /// Write the UTF-8 bytes of `text` and consume their echo.
    pub fn write_str(&mut self, text: &str) -> Result<(), PortError> {
        self.write_bytes(text.as_bytes())
    }

    fn consume_echo(&mut self, sent: &[u8]) -> Result<(), PortError> {
        let mut echoed = vec![0u8; sent.len()];
        let mut filled = 0;
        while filled < echoed.len() {
            let n = self.port.read_blocking_into(&mut echoed[filled..])?;
            if n == 0 {
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "link ended while consuming echo",
                )));
            }
            filled += n;
        }
        trace!(bytes = sent.len(), verify = self.verify_echo, "echo consumed");
        if self.verify_echo {
            for (offset, (&sent_byte, &echoed_byte)) in sent.iter().zip(echoed.iter()).enumerate() {
                if sent_byte != echoed_byte {
                    return Err(PortError::EchoMismatch {
                        offset,
                        sent: sent_byte,
                        echoed: echoed_byte,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<T: Transport> Deref for Rs485Port<T> {
    type Target = Port<T>;

    fn deref(&self) -> &Self::Target {
        &self.port
    }
}

impl<T: Transport> DerefMut for Rs485Port<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.port
    }
}
