//! File-backed transport.
//!
//! Replays a byte source (an in-memory buffer or a file) as the receive
//! side and appends the transmit side to an output file. Intended for
//! protocol replay, golden-transcript testing, and dry-running device
//! logic without hardware.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::port::error::PortError;
use crate::port::settings::PortSettings;
use crate::port::traits::{LinkStream, Transport};

#[derive(Debug, Clone)]
enum FileInput {
    Memory(Vec<u8>),
    Path(PathBuf),
}

/// Transport whose receive side replays a fixed byte source and whose
/// transmit side writes to a file.
///
/// Each open starts the replay over: memory input begins at its first byte
/// again, file input is reopened from the start, and the output file is
/// recreated (truncating anything a previous open wrote).
#[derive(Debug, Clone)]
pub struct FileTransport {
    input: FileInput,
    output: PathBuf,
}

impl FileTransport {
    /// Replay the file at `input`, writing output to `output`.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: FileInput::Path(input.into()),
            output: output.into(),
        }
    }

    /// Replay an in-memory byte buffer, writing output to `output`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: FileInput::Memory(bytes.into()),
            output: output.into(),
        }
    }

    fn input_label(&self) -> String {
        match &self.input {
            FileInput::Memory(bytes) => format!("memory[{}B]", bytes.len()),
            FileInput::Path(path) => path.display().to_string(),
        }
    }
}

impl Transport for FileTransport {
    fn connect(&mut self, _settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        let input = match &self.input {
            FileInput::Memory(bytes) => InputHalf::Memory(Cursor::new(bytes.clone())),
            FileInput::Path(path) => {
                let file = File::open(path).map_err(|e| {
                    if e.kind() == io::ErrorKind::NotFound {
                        PortError::not_found(path.display().to_string())
                    } else {
                        PortError::Io(e)
                    }
                })?;
                // Availability is sized at open; bytes appended afterwards
                // are still readable but not counted.
                let remaining = file.metadata()?.len();
                InputHalf::Disk { file, remaining }
            }
        };
        let output = File::create(&self.output)?;
        debug!(input = %self.input_label(), output = %self.output.display(), "file link opened");
        Ok(Box::new(FileLink {
            input,
            output,
            name: self.input_label(),
        }))
    }

    fn label(&self) -> String {
        format!("file:{}->{}", self.input_label(), self.output.display())
    }
}

#[derive(Debug)]
enum InputHalf {
    Memory(Cursor<Vec<u8>>),
    Disk { file: File, remaining: u64 },
}

#[derive(Debug)]
struct FileLink {
    input: InputHalf,
    output: File,
    name: String,
}

impl LinkStream for FileLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        match &mut self.input {
            InputHalf::Memory(cursor) => Ok(cursor.read(buf)?),
            InputHalf::Disk { file, remaining } => {
                let n = file.read(buf)?;
                *remaining = remaining.saturating_sub(n as u64);
                Ok(n)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        Ok(self.output.write(data)?)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(self.output.flush()?)
    }

    fn available(&mut self) -> Result<usize, PortError> {
        let left = match &self.input {
            InputHalf::Memory(cursor) => {
                (cursor.get_ref().len() as u64).saturating_sub(cursor.position())
            }
            InputHalf::Disk { remaining, .. } => *remaining,
        };
        Ok(usize::try_from(left).unwrap_or(usize::MAX))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("commport-file-test-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_memory_replay_and_output_capture() {
        let out = out_path("mem");
        let mut transport = FileTransport::from_bytes(b"stimulus".to_vec(), &out);

        let mut link = transport.connect(&PortSettings::default()).unwrap();
        assert_eq!(link.available().unwrap(), 8);

        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"stimulus");
        assert_eq!(link.available().unwrap(), 0);
        // Exhausted input reports end-of-stream, not a block.
        assert_eq!(link.read(&mut buf).unwrap(), 0);

        link.write(b"response").unwrap();
        link.flush().unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"response");

        std::fs::remove_file(&out).ok();
    }

    #[test]
    fn test_reconnect_restarts_replay_and_truncates_output() {
        let out = out_path("reopen");
        let mut transport = FileTransport::from_bytes(b"xy".to_vec(), &out);

        let mut link = transport.connect(&PortSettings::default()).unwrap();
        let mut buf = [0u8; 2];
        link.read(&mut buf).unwrap();
        link.write(b"first").unwrap();
        drop(link);

        let mut link = transport.connect(&PortSettings::default()).unwrap();
        assert_eq!(link.available().unwrap(), 2);
        link.write(b"2nd").unwrap();
        link.flush().unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"2nd");

        std::fs::remove_file(&out).ok();
    }

    #[test]
    fn test_disk_input() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("stimulus.bin");
        std::fs::write(&in_path, b"abcdef").unwrap();
        let out = dir.path().join("capture.bin");

        let mut transport = FileTransport::new(&in_path, &out);
        let mut link = transport.connect(&PortSettings::default()).unwrap();

        assert_eq!(link.available().unwrap(), 6);
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 4);
        assert_eq!(link.available().unwrap(), 2);
    }

    #[test]
    fn test_missing_input_file_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FileTransport::new(dir.path().join("absent.bin"), dir.path().join("o"));
        let err = transport.connect(&PortSettings::default()).unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[test]
    fn test_label_shows_both_ends() {
        let transport = FileTransport::from_bytes(b"ab".to_vec(), "/tmp/out.bin");
        assert_eq!(transport.label(), "file:memory[2B]->/tmp/out.bin");
    }
}
