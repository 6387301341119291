//! Byte-stream link to the board
//!
//! The capture protocol only needs the small [`Transport`] surface; the
//! serial implementation lives in [`serial`].

mod serial;

pub use serial::{list_ports, PortInfo, SerialTransport, TransportError, BAUD_RATE};

use std::io;
use std::time::Duration;

/// Read timeout used when the caller did not configure one
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Open, bidirectional byte stream with a configurable read timeout
///
/// A read that gives up because of the timeout returns an error of kind
/// [`io::ErrorKind::TimedOut`] (or `WouldBlock`); `Ok(0)` means the link
/// delivered nothing at all.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Drops whatever is waiting in the input buffer
    fn clear_input(&mut self) -> io::Result<()>;

    /// Writes the whole buffer
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Pushes pending output onto the wire
    fn flush(&mut self) -> io::Result<()>;

    /// Reads up to `buf.len()` bytes, blocking at most for the read timeout
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Current read timeout, `None` meaning "block indefinitely"
    fn timeout(&self) -> Option<Duration>;

    /// Changes the read timeout; `Some(Duration::ZERO)` makes reads non-blocking
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn timeout(&self) -> Option<Duration> {
        (**self).timeout()
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }
}

/// OS-level access to serial ports: enumeration and opening
#[cfg_attr(test, mockall::automock)]
pub trait PortBackend: Send {
    /// Ports currently present, in display order
    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError>;

    /// Opens `device` ready for captures
    fn open(&self, device: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// [`PortBackend`] backed by the real serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl PortBackend for SerialBackend {
    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        list_ports()
    }

    fn open(&self, device: &str) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SerialTransport::open(device)?))
    }
}

/// True for the error kinds a read returns when its timeout expired
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn boxed_transport_forwards() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(DEFAULT_READ_TIMEOUT));
        mock.expect_set_timeout()
            .withf(|timeout| *timeout == Some(Duration::ZERO))
            .times(1)
            .returning(|_| Ok(()));

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        assert_eq!(boxed.timeout(), Some(DEFAULT_READ_TIMEOUT));
        boxed.set_timeout(Some(Duration::ZERO)).unwrap();
    }
}
