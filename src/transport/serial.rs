//! USB-CDC serial port transport
//!
//! Uses serialport for cross-platform port enumeration and I/O.

use super::{Transport, DEFAULT_READ_TIMEOUT};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Line speed expected by the board firmware
pub const BAUD_RATE: u32 = 115_200;

/// Some cores reset when the port opens; give them a moment to come back
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Stand-in for "no timeout": serialport always wants a finite value
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Serial transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Port enumeration failed: {0}")]
    Enumerate(#[source] serialport::Error),
}

/// A serial port as shown in the port picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS device path (`/dev/ttyACM0`, `COM5`, ...)
    pub device: String,
    /// Human readable description, empty when the OS gives none
    pub description: String,
    pub is_usb: bool,
}

impl PortInfo {
    /// Label shown in the UI: device followed by its description
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            self.device.clone()
        } else {
            format!("{} - {}", self.device, self.description)
        }
    }

    fn from_serialport(info: serialport::SerialPortInfo) -> Self {
        let (description, is_usb) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = usb
                    .product
                    .or(usb.manufacturer)
                    .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid));
                (description, true)
            }
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), false),
            SerialPortType::PciPort => ("PCI".to_string(), false),
            SerialPortType::Unknown => (String::new(), false),
        };
        Self {
            device: info.port_name,
            description,
            is_usb,
        }
    }
}

/// Lists the serial ports known to the OS, USB devices first
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(TransportError::Enumerate)?;
    let ports = sort_ports(ports.into_iter().map(PortInfo::from_serialport).collect());
    tracing::debug!("Serial ports: {:?}", ports);
    Ok(ports)
}

/// Orders ports so CDC ACM/USB devices come before the rest, then by name
fn sort_ports(mut ports: Vec<PortInfo>) -> Vec<PortInfo> {
    ports.sort_by(|a, b| (!a.is_usb, &a.device).cmp(&(!b.is_usb, &b.device)));
    ports
}

/// Open serial connection to the board
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    timeout: Option<Duration>,
}

impl SerialTransport {
    /// Opens `device` at 115200 baud and flushes any startup chatter (e.g. `READY`)
    pub fn open(device: &str) -> Result<Self, TransportError> {
        let port = serialport::new(device, BAUD_RATE)
            .timeout(DEFAULT_READ_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Open {
                port: device.to_string(),
                source,
            })?;

        thread::sleep(SETTLE_DELAY);

        port.clear(ClearBuffer::All)
            .map_err(|source| TransportError::Open {
                port: device.to_string(),
                source,
            })?;

        tracing::info!("Serial port {} opened at {} baud", device, BAUD_RATE);

        Ok(Self {
            port,
            name: device.to_string(),
            timeout: Some(DEFAULT_READ_TIMEOUT),
        })
    }
}

impl Transport for SerialTransport {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.port.set_timeout(timeout.unwrap_or(BLOCKING_TIMEOUT))?;
        self.timeout = timeout;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        tracing::info!("Serial port {} closed", self.name);
    }
}
