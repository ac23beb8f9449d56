//! Device-file transport.
//!
//! Talks to a character device (typically a tty) through plain file I/O,
//! optionally shelling out to `stty` to set the line discipline. Useful on
//! systems where the `serialport` backend can't reach the device, or where
//! the line is already configured and only the byte stream matters.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::serial::{FlowControl, LineParams, Parity, StopBits};
use crate::port::error::PortError;
use crate::port::settings::PortSettings;
use crate::port::traits::{LinkStream, Transport};

/// When, if at all, `stty` is invoked relative to opening the device file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttyMode {
    /// Never invoke `stty`; the line keeps whatever discipline it has.
    #[default]
    Off,
    /// Configure the line, then open the file.
    BeforeOpen,
    /// Open the file, then configure the line.
    AfterOpen,
}

/// The `stty` argument list for a device and its line parameters.
///
/// Always ends with `-echo`: a line that echoes its own input corrupts
/// request/response traffic.
fn stty_args(path: &Path, params: &LineParams) -> Result<Vec<String>, PortError> {
    let mut args = vec![
        "-F".to_string(),
        path.display().to_string(),
        params.baud.to_string(),
        format!("cs{}", params.data_bits.count()),
    ];
    args.push(
        match params.stop_bits {
            StopBits::One => "-cstopb",
            StopBits::Two => "cstopb",
        }
        .to_string(),
    );
    match params.parity {
        Parity::None => args.extend(["ignpar".to_string(), "-parenb".to_string()]),
        Parity::Even => args.extend(["parenb".to_string(), "-parodd".to_string()]),
        Parity::Odd => args.extend(["parenb".to_string(), "parodd".to_string()]),
        Parity::Mark => args.push("parmrk".to_string()),
        // Rejected at construction; kept as an error rather than a panic in
        // case params arrive through a future unchecked path.
        Parity::Space => return Err(PortError::invalid("parity", Parity::Space)),
    }
    match params.flow_control {
        FlowControl::None => {}
        FlowControl::Software => args.extend(["ixoff".to_string(), "ixon".to_string()]),
        FlowControl::Hardware => args.push("crtscts".to_string()),
    }
    args.push("-echo".to_string());
    Ok(args)
}

/// Transport opening a device file directly.
#[derive(Debug, Clone)]
pub struct DeviceTransport {
    path: PathBuf,
    params: LineParams,
    stty: SttyMode,
}

impl DeviceTransport {
    /// Create a transport for the device at `path`.
    ///
    /// Space parity is rejected here: `stty` has no word for it, and this
    /// backend has no other way to set the line.
    pub fn new(
        path: impl Into<PathBuf>,
        params: LineParams,
        stty: SttyMode,
    ) -> Result<Self, PortError> {
        params.validate()?;
        if params.parity == Parity::Space {
            return Err(PortError::invalid("parity", Parity::Space));
        }
        Ok(Self {
            path: path.into(),
            params,
            stty,
        })
    }

    /// The device path this transport opens.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured line parameters.
    pub fn params(&self) -> &LineParams {
        &self.params
    }

    /// Replace the line parameters. Takes effect the next time the owning
    /// port opens.
    pub fn set_params(&mut self, params: LineParams) -> Result<(), PortError> {
        params.validate()?;
        if params.parity == Parity::Space {
            return Err(PortError::invalid("parity", Parity::Space));
        }
        self.params = params;
        Ok(())
    }

    #[cfg(unix)]
    fn run_stty(&self) -> Result<(), PortError> {
        let args = stty_args(&self.path, &self.params)?;
        debug!(path = %self.path.display(), ?args, "configuring line via stty");
        // Failure to spawn is an open failure; a nonzero exit is only
        // logged, since many lines work fine with partial settings.
        let status = Command::new("stty").args(&args).status()?;
        if !status.success() {
            warn!(path = %self.path.display(), %status, "stty exited with failure status");
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn run_stty(&self) -> Result<(), PortError> {
        debug!(path = %self.path.display(), "stty line configuration skipped on this platform");
        Ok(())
    }
}

impl Transport for DeviceTransport {
    fn connect(&mut self, _settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        if self.stty == SttyMode::BeforeOpen {
            self.run_stty()?;
        }
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        options.custom_flags(libc::O_NOCTTY);
        let reader = options.open(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PortError::not_found(self.path.display().to_string())
            } else {
                PortError::Io(e)
            }
        })?;
        let writer = reader.try_clone()?;
        if self.stty == SttyMode::AfterOpen {
            self.run_stty()?;
        }
        debug!(path = %self.path.display(), "device file opened");
        Ok(Box::new(DeviceLink {
            reader,
            writer,
            name: self.path.display().to_string(),
        }))
    }

    fn label(&self) -> String {
        format!("device:{}", self.path.display())
    }
}

/// Live device-file connection. Reads block with no timeout of any kind;
/// pair this transport with the engine's explicit waits on silent lines.
#[derive(Debug)]
struct DeviceLink {
    reader: File,
    writer: File,
    name: String,
}

impl LinkStream for DeviceLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        use std::io::Read;
        Ok(self.reader.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        use std::io::Write;
        Ok(self.writer.write(data)?)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        use std::io::Write;
        Ok(self.writer.flush()?)
    }

    #[cfg(unix)]
    fn available(&mut self) -> Result<usize, PortError> {
        let mut count: libc::c_int = 0;
        // SAFETY: the fd is owned by `reader` and stays open for the call;
        // FIONREAD writes a single c_int.
        let rc = unsafe { libc::ioctl(self.reader.as_raw_fd(), libc::FIONREAD as _, &mut count) };
        if rc < 0 {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        Ok(count.max(0) as usize)
    }

    #[cfg(not(unix))]
    fn available(&mut self) -> Result<usize, PortError> {
        Ok(0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
