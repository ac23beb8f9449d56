//! Serial transport over the `serialport` crate.
//!
//! Line parameters are typed enums, so most of the legal-set checking is
//! done by construction; what's left (baud rate, backend parity support)
//! is validated when the transport is built, not when the port opens.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::port::error::PortError;
use crate::port::settings::PortSettings;
use crate::port::traits::{LinkStream, Transport};

/// Baud rates accepted as line parameters.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    110, 300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 128000, 230400,
    256000, 460800, 921600,
];

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// The bit count as a number, e.g. for `stty cs8`.
    pub fn count(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, PortError> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(PortError::invalid("data bits", other)),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, PortError> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(PortError::invalid("stop bits", other)),
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}

/// Parity checking modes.
///
/// `Mark` and `Space` are carried for device-file setups that configure the
/// line themselves; the `serialport` backend does not support them and
/// rejects them when the transport is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, PortError> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Mark | Parity::Space => Err(PortError::invalid("parity", parity)),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Even => "even",
            Self::Odd => "odd",
            Self::Mark => "mark",
            Self::Space => "space",
        };
        f.write_str(name)
    }
}

impl FromStr for Parity {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, PortError> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "even" | "e" => Ok(Self::Even),
            "odd" | "o" => Ok(Self::Odd),
            "mark" | "m" => Ok(Self::Mark),
            "space" | "s" => Ok(Self::Space),
            other => Err(PortError::invalid("parity", other)),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Software => "software",
            Self::Hardware => "hardware",
        };
        f.write_str(name)
    }
}

impl FromStr for FlowControl {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, PortError> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "software" | "sw" | "xonxoff" => Ok(Self::Software),
            "hardware" | "hw" | "rtscts" => Ok(Self::Hardware),
            other => Err(PortError::invalid("flow control", other)),
        }
    }
}

/// Line parameters for a serial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineParams {
    /// Baud rate (bits per second).
    pub baud: u32,
    /// Number of data bits (5-8).
    pub data_bits: DataBits,
    /// Number of stop bits (1-2).
    pub stop_bits: StopBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Flow control mode.
    pub flow_control: FlowControl,
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl LineParams {
    /// 8N1 at the given baud rate.
    pub fn with_baud(baud: u32) -> Self {
        Self {
            baud,
            ..Self::default()
        }
    }

    /// Check the parameters a type can't: the baud rate must be one of
    /// [`STANDARD_BAUD_RATES`].
    pub fn validate(&self) -> Result<(), PortError> {
        if !STANDARD_BAUD_RATES.contains(&self.baud) {
            return Err(PortError::invalid("baud rate", self.baud));
        }
        Ok(())
    }
}

/// Information about an enumerable serial port on this system.
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// OS name of the port (`/dev/ttyUSB0`, `COM3`, ...).
    pub name: String,
    /// What kind of port it is, with USB identity when known.
    pub description: String,
}

/// List the serial ports visible on this system.
pub fn enumerate_ports() -> Result<Vec<PortInfo>, PortError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            name: p.port_name,
            description: describe_port_type(&p.port_type),
        })
        .collect())
}

fn describe_port_type(kind: &serialport::SerialPortType) -> String {
    match kind {
        serialport::SerialPortType::UsbPort(usb) => {
            let mut text = format!("USB {:04x}:{:04x}", usb.vid, usb.pid);
            if let Some(product) = &usb.product {
                text.push(' ');
                text.push_str(product);
            }
            text
        }
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Transport connecting through the `serialport` backend.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    path: String,
    params: LineParams,
}

impl SerialTransport {
    /// Create a transport for the port at `path` with the given line
    /// parameters. Parameters are validated here, so a bad baud rate or a
    /// parity mode the backend can't do fails fast instead of at open.
    pub fn new(path: impl Into<String>, params: LineParams) -> Result<Self, PortError> {
        params.validate()?;
        serialport::Parity::try_from(params.parity)?;
        Ok(Self {
            path: path.into(),
            params,
        })
    }

    /// The device path this transport opens.
    pub fn path(&self) -> &str {
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
        serialport::Parity::try_from(params.parity)?;
        self.params = params;
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self, settings: &PortSettings) -> Result<Box<dyn LinkStream>, PortError> {
        let port = serialport::new(&self.path, self.params.baud)
            .data_bits(self.params.data_bits.into())
            .stop_bits(self.params.stop_bits.into())
            .parity(self.params.parity.try_into()?)
            .flow_control(self.params.flow_control.into())
            .timeout(settings.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(&self.path),
                serialport::ErrorKind::InvalidInput => PortError::invalid("serial parameters", e),
                _ => PortError::Serial(e),
            })?;
        debug!(path = %self.path, baud = self.params.baud, "serial port opened");
        Ok(Box::new(SerialLink {
            port,
            path: self.path.clone(),
        }))
    }

    fn label(&self) -> String {
        format!("serial:{}", self.path)
    }
}

/// Live serial connection.
///
/// The port's timeout is installed as the backend read timeout at open, so
/// blocking reads surface a timeout I/O error instead of hanging forever on
/// a silent line.
struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl LinkStream for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        Ok(self.port.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(self.port.flush()?)
    }

    fn available(&mut self) -> Result<usize, PortError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_line_params() {
        let params = LineParams::default();
        assert_eq!(params.baud, 9600);
        assert_eq!(params.data_bits, DataBits::Eight);
        assert_eq!(params.stop_bits, StopBits::One);
        assert_eq!(params.parity, Parity::None);
        assert_eq!(params.flow_control, FlowControl::None);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_nonstandard_baud_rejected() {
        let params = LineParams::with_baud(12345);
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            PortError::InvalidParameter { param: "baud rate", .. }
        ));
    }

    #[test]
    fn test_data_bits_conversion() {
        let bits = DataBits::try_from(7).unwrap();
        assert_eq!(bits, DataBits::Seven);
        let backend: serialport::DataBits = bits.into();
        assert_eq!(backend, serialport::DataBits::Seven);

        assert!(DataBits::try_from(9).is_err());
    }

    #[test]
    fn test_stop_bits_conversion() {
        let bits = StopBits::try_from(2).unwrap();
        let backend: serialport::StopBits = bits.into();
        assert_eq!(backend, serialport::StopBits::Two);

        assert!(StopBits::try_from(0).is_err());
    }

    #[test]
    fn test_parity_conversion() {
        let backend: serialport::Parity = Parity::Even.try_into().unwrap();
        assert_eq!(backend, serialport::Parity::Even);

        assert!(serialport::Parity::try_from(Parity::Mark).is_err());
        assert!(serialport::Parity::try_from(Parity::Space).is_err());
    }

    #[test]
    fn test_flow_control_conversion() {
        let backend: serialport::FlowControl = FlowControl::Hardware.into();
        assert_eq!(backend, serialport::FlowControl::Hardware);
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!(Parity::from_str("even").unwrap(), Parity::Even);
        assert_eq!(Parity::from_str("N").unwrap(), Parity::None);
        assert!(Parity::from_str("meh").is_err());
    }

    #[test]
    fn test_flow_control_from_str() {
        assert_eq!(FlowControl::from_str("rtscts").unwrap(), FlowControl::Hardware);
        assert_eq!(FlowControl::from_str("SW").unwrap(), FlowControl::Software);
        assert!(FlowControl::from_str("yes").is_err());
    }

    #[test]
    fn test_transport_rejects_unsupported_parity_up_front() {
        let params = LineParams {
            parity: Parity::Mark,
            ..LineParams::default()
        };
        assert!(SerialTransport::new("/dev/ttyUSB0", params).is_err());
    }

    #[test]
    fn test_open_nonexistent_port_fails() {
        let mut transport =
            SerialTransport::new("/dev/nonexistent_port_12345", LineParams::default()).unwrap();
        let result = transport.connect(&PortSettings::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_label_includes_path() {
        let transport = SerialTransport::new("COM7", LineParams::default()).unwrap();
        assert_eq!(transport.label(), "serial:COM7");
    }
}
