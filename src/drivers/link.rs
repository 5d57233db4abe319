use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::drivers::DriverError;

/// Longest line the controller is allowed to send before a newline. A port
/// streaming newline-free bytes (a wrong baud rate, usually) fails the read
/// once this much is buffered.
pub const MAX_LINE_LEN: usize = 256;

/// Anything that can stand in for an open serial port.
pub trait Channel: Read + Write + Send {
    /// Bytes that can be read right now without blocking.
    fn bytes_available(&self) -> io::Result<usize>;
}
impl Channel for Box<dyn SerialPort> {
    fn bytes_available(&self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }
}

/// A port as reported by the operating system, in discovery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    pub port_name: String,
    pub description: String,
}
impl PortDescriptor {
    pub fn named(port_name: impl Into<String>) -> Self {
        let port_name = port_name.into();
        Self {
            description: port_name.clone(),
            port_name,
        }
    }
}
impl From<SerialPortInfo> for PortDescriptor {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let parts: Vec<String> = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect();
                if parts.is_empty() {
                    format!("{}: USB Serial", info.port_name)
                } else {
                    format!("{}: {}", info.port_name, parts.join(" "))
                }
            }
            SerialPortType::BluetoothPort => format!("{}: Bluetooth", info.port_name),
            SerialPortType::PciPort => format!("{}: PCI", info.port_name),
            SerialPortType::Unknown => info.port_name.clone(),
        };
        Self {
            port_name: info.port_name,
            description,
        }
    }
}
/// Opens ports and enumerates candidates. The system implementation talks to
/// real hardware; tests substitute a scripted one.
pub trait PortOpener {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn Channel>, DriverError>;
    fn list(&self) -> Result<Vec<PortDescriptor>, DriverError>;
}
pub struct SystemPorts {
    read_timeout: Duration,
}
impl SystemPorts {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}
impl PortOpener for SystemPorts {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn Channel>, DriverError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(self.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;
        Ok(Box::new(port))
    }
    fn list(&self) -> Result<Vec<PortDescriptor>, DriverError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(PortDescriptor::from)
            .collect())
    }
}
/// The single live connection to the controller board.
///
/// Every `write_message` is written and flushed as one unit. A failed write
/// marks the link disconnected; from then on all I/O returns
/// [`DriverError::Disconnected`] without touching the port.
pub struct ConnectedLink {
    port_name: String,
    baud_rate: u32,
    io: Box<dyn Channel>,
    pending: Vec<u8>,
    connected: bool,
}
impl ConnectedLink {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, io: Box<dyn Channel>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            io,
            pending: Vec::new(),
            connected: true,
        }
    }
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
    pub fn is_connected(&self) -> bool {
        self.connected
    }
    pub fn write_message(&mut self, message: &str) -> Result<(), DriverError> {
        if !self.connected {
            return Err(DriverError::Disconnected);
        }
        let written = self
            .io
            .write_all(message.as_bytes())
            .and_then(|_| self.io.flush());
        if let Err(err) = written {
            warn!("write to {} failed: {err}", self.port_name);
            self.connected = false;
            return Err(DriverError::Write(err));
        }
        debug!("{} <- {message}", self.port_name);
        Ok(())
    }
    /// Reads one newline-terminated line, trailing whitespace removed.
    /// Blocks up to the port's read timeout for each chunk.
    pub fn read_line(&mut self) -> Result<String, DriverError> {
        if !self.connected {
            return Err(DriverError::Disconnected);
        }
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(line);
            }
            self.fill()?;
        }
    }
    /// Returns a complete line if one is buffered or already waiting on the
    /// port, without blocking. A partial line stays buffered for the next call.
    pub fn poll_line(&mut self) -> Result<Option<String>, DriverError> {
        if !self.connected {
            return Err(DriverError::Disconnected);
        }
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            if self.io.bytes_available()? == 0 {
                return Ok(None);
            }
            self.fill()?;
        }
    }
    fn take_line(&mut self) -> Result<Option<String>, DriverError> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            if self.pending.len() > MAX_LINE_LEN {
                let buffered = self.pending.len();
                self.pending.clear();
                return Err(DriverError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("no line break in {buffered} bytes"),
                )));
            }
            return Ok(None);
        };
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line).trim_end().to_string();
        debug!("{} -> {text}", self.port_name);
        Ok(Some(text))
    }
    fn fill(&mut self) -> Result<(), DriverError> {
        let mut chunk = [0u8; 256];
        loop {
            match self.io.read(&mut chunk) {
                Ok(0) => {
                    return Err(DriverError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial stream closed",
                    )))
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
    pub fn disconnect(&mut self) {
        if self.connected {
            debug!("closing {}", self.port_name);
        }
        self.connected = false;
        self.pending.clear();
    }
}
impl std::fmt::Debug for ConnectedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedLink")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.connected)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{written, ScriptedPort};
    use super::*;
    #[test]
    fn read_line_splits_on_newline_and_strips_cr() {
        let (port, _) = ScriptedPort::new("first\r\nsecond\n");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        assert_eq!(link.read_line().unwrap(), "first");
        assert_eq!(link.read_line().unwrap(), "second");
        assert!(matches!(link.read_line(), Err(DriverError::Io(_))));
    }
    #[test]
    fn read_line_reports_closed_stream() {
        let (port, _) = ScriptedPort::new("partial");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port.closing()));
        match link.read_line() {
            Err(DriverError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }
    #[test]
    fn read_line_gives_up_on_endless_lines() {
        let noise = "\u{7f}".repeat(MAX_LINE_LEN + 60);
        let (port, _) = ScriptedPort::new(&noise);
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        match link.read_line() {
            Err(DriverError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected {other:?}"),
        }
    }
    #[test]
    fn lines_up_to_the_limit_still_arrive() {
        let long = format!("{}\n", "x".repeat(MAX_LINE_LEN));
        let (port, _) = ScriptedPort::new(&long);
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        assert_eq!(link.read_line().unwrap().len(), MAX_LINE_LEN);
    }
    #[test]
    fn poll_line_returns_nothing_until_a_line_is_complete() {
        let (port, _) = ScriptedPort::new("");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        assert_eq!(link.poll_line().unwrap(), None);

        let (port, _) = ScriptedPort::new("Act 1 OK\nAct 2");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        assert_eq!(link.poll_line().unwrap().as_deref(), Some("Act 1 OK"));
        assert_eq!(link.poll_line().unwrap(), None);
    }
    #[test]
    fn failed_write_disconnects_the_link() {
        let (port, transcript) = ScriptedPort::new("");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port.failing_writes()));
        assert!(matches!(link.write_message("abc"), Err(DriverError::Write(_))));
        assert!(!link.is_connected());
        assert!(matches!(
            link.write_message("abc"),
            Err(DriverError::Disconnected)
        ));
        assert!(written(&transcript).is_empty());
    }
    #[test]
    fn writes_reach_the_port() {
        let (port, transcript) = ScriptedPort::new("");
        let mut link = ConnectedLink::new("COM9", 9600, Box::new(port));
        link.write_message("0c0500").unwrap();
        link.write_message("wav0").unwrap();
        assert_eq!(written(&transcript), "0c0500wav0");
    }
}
