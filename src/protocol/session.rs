//! One `REC` round trip with the board
//!
//! Sends the command, waits for the `DATA,<n>` header (skipping blank and
//! `ACK` lines), then reads exactly `n` little-endian i16 samples.

use super::header::HeaderLine;
use super::request::{CaptureRequest, RequestError, MAX_SAMPLE_COUNT};
use crate::transport::{is_timeout, Transport, DEFAULT_READ_TIMEOUT};
use std::fmt;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Size of the reads used while looking for text lines
const LINE_CHUNK: usize = 64;

/// A "line" longer than this without a newline is handed over as is
const MAX_LINE_LEN: usize = 256;

/// What the device had sent when the header wait ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWait {
    /// At least one `ACK` line arrived
    AfterAck,
    /// Nothing but blank lines (or nothing at all)
    OnlyBlank,
}

impl fmt::Display for HeaderWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderWait::AfterAck => f.write_str("after ACK"),
            HeaderWait::OnlyBlank => f.write_str("(only blank lines)"),
        }
    }
}

/// Capture protocol errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device did not send DATA header {0}.")]
    HeaderTimeout(HeaderWait),

    #[error("Unexpected header from device: {0:?}")]
    UnexpectedHeader(String),

    #[error("Malformed DATA header: {0:?}")]
    MalformedHeader(String),

    #[error("Timed out while reading audio bytes from device ({received} of {expected} bytes)")]
    TruncatedPayload { received: usize, expected: usize },

    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Requests one capture of `duration_secs` seconds at `sample_rate` Hz.
///
/// Unusable parameters are rejected before anything is written.
/// The device-declared sample count wins over the requested one. The
/// transport's read timeout is the same after the call as before it.
pub fn capture<T>(transport: &mut T, sample_rate: u32, duration_secs: f64) -> Result<Vec<i16>, CaptureError>
where
    T: Transport + ?Sized,
{
    let request = CaptureRequest::new(sample_rate, duration_secs)?;
    CaptureSession::new(transport).run(&request)
}

/// Restores the transport's read timeout when dropped
struct TimeoutGuard<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    saved: Option<Duration>,
    changed: bool,
}

impl<'a, T: Transport + ?Sized> TimeoutGuard<'a, T> {
    fn new(transport: &'a mut T) -> Self {
        let saved = transport.timeout();
        Self {
            transport,
            saved,
            changed: false,
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.changed = true;
        self.transport.set_timeout(timeout)
    }
}

impl<T: Transport + ?Sized> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if self.changed {
            if let Err(e) = self.transport.set_timeout(self.saved) {
                tracing::warn!("Could not restore serial read timeout: {}", e);
            }
        }
    }
}

/// State of a single capture: the transport plus bytes read past the last line
pub struct CaptureSession<'a, T: Transport + ?Sized> {
    link: TimeoutGuard<'a, T>,
    pending: Vec<u8>,
}

impl<'a, T: Transport + ?Sized> CaptureSession<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            link: TimeoutGuard::new(transport),
            pending: Vec::with_capacity(LINE_CHUNK * 2),
        }
    }

    /// Runs the whole exchange for `request`
    pub fn run(mut self, request: &CaptureRequest) -> Result<Vec<i16>, CaptureError> {
        if self.link.saved.is_none() {
            // Header lines need a finite timeout for the wait budget to apply
            self.link.set_timeout(Some(DEFAULT_READ_TIMEOUT))?;
        }

        // Stale bytes from an earlier failed capture would look like a bad header
        self.link.transport.clear_input()?;
        self.link.transport.write_all(&request.command_line())?;
        self.link.transport.flush()?;
        let budget = request.wait_budget();
        let deadline = Instant::now()
            .checked_add(budget)
            .ok_or(RequestError::InvalidDuration(request.duration_secs()))?;

        tracing::debug!(
            "REC sent: {} samples ({:.2}s) at {} Hz, header budget {:?}",
            request.sample_count(),
            request.duration_secs(),
            request.sample_rate(),
            budget
        );

        let declared = self.read_header(deadline)?;
        if declared != request.sample_count() {
            tracing::debug!(
                "Device declared {} samples instead of {}",
                declared,
                request.sample_count()
            );
        }

        let samples = self.read_payload(declared)?;
        self.read_trailer();

        tracing::info!("Captured {} samples at {} Hz", samples.len(), request.sample_rate());
        Ok(samples)
    }

    /// Waits for `DATA,<n>` and returns `n`
    fn read_header(&mut self, deadline: Instant) -> Result<usize, CaptureError> {
        let mut ack_seen = false;
        let timed_out = |ack_seen: bool| {
            CaptureError::HeaderTimeout(if ack_seen {
                HeaderWait::AfterAck
            } else {
                HeaderWait::OnlyBlank
            })
        };

        loop {
            let Some(line) = self.read_line()? else {
                if Instant::now() > deadline {
                    return Err(timed_out(ack_seen));
                }
                continue;
            };

            match HeaderLine::classify(&line) {
                HeaderLine::Blank => {
                    if Instant::now() > deadline {
                        return Err(timed_out(ack_seen));
                    }
                }
                HeaderLine::Ack => {
                    tracing::debug!("ACK received");
                    ack_seen = true;
                    if Instant::now() > deadline {
                        return Err(timed_out(ack_seen));
                    }
                }
                HeaderLine::Data(Ok(count)) if count <= MAX_SAMPLE_COUNT => {
                    tracing::debug!("DATA header: {} samples", count);
                    return Ok(count);
                }
                HeaderLine::Data(Ok(count)) => {
                    return Err(CaptureError::MalformedHeader(format!("DATA,{}", count)));
                }
                HeaderLine::Data(Err(header)) => {
                    return Err(CaptureError::MalformedHeader(header));
                }
                HeaderLine::Other(preview) => {
                    return Err(CaptureError::UnexpectedHeader(preview));
                }
            }
        }
    }

    /// Reads `count` samples, starting with bytes already pulled in with the header
    fn read_payload(&mut self, count: usize) -> Result<Vec<i16>, CaptureError> {
        let expected = count * 2;
        let mut buf = vec![0u8; expected];

        let mut got = self.pending.len().min(expected);
        buf[..got].copy_from_slice(&self.pending[..got]);
        self.pending.drain(..got);

        while got < expected {
            match self.link.transport.read(&mut buf[got..]) {
                Ok(0) => return Err(CaptureError::TruncatedPayload { received: got, expected }),
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => {
                    return Err(CaptureError::TruncatedPayload { received: got, expected });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Best-effort read of the closing line (`DONE`); never fails the capture
    fn read_trailer(&mut self) {
        if let Err(e) = self.link.set_timeout(Some(Duration::ZERO)) {
            tracing::debug!("Could not switch to non-blocking read: {}", e);
            return;
        }
        match self.read_line() {
            Ok(Some(line)) => tracing::debug!("Trailer: {:?}", String::from_utf8_lossy(line.trim_ascii())),
            Ok(None) => tracing::debug!("No trailer line"),
            Err(e) => tracing::debug!("Trailer read failed: {}", e),
        }
    }

    /// Next `\n`-terminated line, or `None` when the read timed out first.
    ///
    /// A partial line stays buffered for the next call.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                return Ok(Some(self.pending.drain(..=pos).collect()));
            }
            if self.pending.len() >= MAX_LINE_LEN {
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let mut chunk = [0u8; LINE_CHUNK];
            match self.link.transport.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::collections::VecDeque;

    fn timed_out() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "timed out")
    }

    /// Feeds `chunks` to successive reads, then times out forever
    fn script_reads(mock: &mut MockTransport, chunks: Vec<Vec<u8>>) {
        let mut chunks: VecDeque<Vec<u8>> = chunks.into();
        mock.expect_read().returning(move |buf| {
            let Some(mut chunk) = chunks.pop_front() else {
                return Err(timed_out());
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        });
    }

    fn expect_command(mock: &mut MockTransport, command: &'static [u8]) {
        mock.expect_clear_input().times(1).returning(|| Ok(()));
        mock.expect_write_all()
            .withf(move |buf| buf.to_vec() == command)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_flush().times(1).returning(|| Ok(()));
    }

    #[test]
    fn malformed_header_reads_no_payload() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(Duration::from_secs(2)));
        mock.expect_set_timeout().never();
        expect_command(&mut mock, b"REC,4,4\n");
        mock.expect_read().times(1).returning(|buf| {
            let line = b"DATA,four\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        });

        let err = capture(&mut mock, 4, 1.0).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedHeader(ref h) if h == "DATA,four"));
    }

    #[test]
    fn unset_timeout_is_restored_after_success() {
        let mut mock = MockTransport::new();
        let mut seq = Sequence::new();
        mock.expect_timeout().return_const(None);
        mock.expect_set_timeout()
            .with(eq(Some(DEFAULT_READ_TIMEOUT)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_timeout()
            .with(eq(Some(Duration::ZERO)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_timeout()
            .with(eq(None))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        expect_command(&mut mock, b"REC,4,2\n");
        script_reads(&mut mock, vec![b"ACK\nDATA,2\n\x01\x00\xff\xffDONE\n".to_vec()]);

        let samples = capture(&mut mock, 4, 0.5).unwrap();
        assert_eq!(samples, vec![1, -1]);
    }

    #[test]
    fn configured_timeout_is_restored_after_unexpected_header() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(Duration::from_millis(1500)));
        mock.expect_set_timeout().never();
        expect_command(&mut mock, b"REC,8000,8000\n");
        script_reads(&mut mock, vec![b"READY\n".to_vec()]);

        let err = capture(&mut mock, 8000, 1.0).unwrap_err();
        assert!(matches!(err, CaptureError::UnexpectedHeader(ref p) if p == "READY"));
    }

    #[test]
    fn unset_timeout_is_restored_after_write_failure() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(None);
        mock.expect_set_timeout()
            .with(eq(Some(DEFAULT_READ_TIMEOUT)))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_timeout()
            .with(eq(None))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_clear_input().returning(|| Ok(()));
        mock.expect_write_all()
            .returning(|_| Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        mock.expect_flush().never();
        mock.expect_read().never();

        let err = capture(&mut mock, 8000, 1.0).unwrap_err();
        assert!(matches!(err, CaptureError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn payload_split_across_reads() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(Duration::from_secs(2)));
        mock.expect_set_timeout().returning(|_| Ok(()));
        expect_command(&mut mock, b"REC,4,4\n");
        script_reads(
            &mut mock,
            vec![
                b"DA".to_vec(),
                b"TA,3\n\x0a".to_vec(),
                b"\x00".to_vec(),
                b"\x00\x80\xff".to_vec(),
                b"\x7f".to_vec(),
            ],
        );

        let samples = capture(&mut mock, 4, 1.0).unwrap();
        assert_eq!(samples, vec![10, i16::MIN, i16::MAX]);
    }

    #[test]
    fn stalled_payload_is_truncated() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(Duration::from_secs(2)));
        mock.expect_set_timeout().never();
        expect_command(&mut mock, b"REC,4,4\n");
        script_reads(&mut mock, vec![b"DATA,4\n\x01\x00\x02".to_vec()]);

        let err = capture(&mut mock, 4, 1.0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::TruncatedPayload { received: 3, expected: 8 }
        ));
    }

    #[test]
    fn oversized_declaration_is_malformed() {
        let mut mock = MockTransport::new();
        mock.expect_timeout().return_const(Some(Duration::from_secs(2)));
        mock.expect_set_timeout().never();
        expect_command(&mut mock, b"REC,4,4\n");
        script_reads(&mut mock, vec![b"DATA,99999999999\n".to_vec()]);

        let err = capture(&mut mock, 4, 1.0).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedHeader(_)));
    }

    #[test]
    fn unusable_duration_never_reaches_the_wire() {
        for duration in [f64::INFINITY, 1e19, 0.0, f64::NAN] {
            // Any call on the transport would fail the test
            let mut mock = MockTransport::new();
            let err = capture(&mut mock, 4, duration).unwrap_err();
            assert!(matches!(err, CaptureError::InvalidRequest(_)));
        }
    }

    #[test]
    fn header_timeout_messages() {
        assert_eq!(
            CaptureError::HeaderTimeout(HeaderWait::AfterAck).to_string(),
            "Device did not send DATA header after ACK."
        );
        assert_eq!(
            CaptureError::HeaderTimeout(HeaderWait::OnlyBlank).to_string(),
            "Device did not send DATA header (only blank lines)."
        );
    }
}
