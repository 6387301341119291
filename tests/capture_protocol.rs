//! End-to-end capture exchanges against a scripted board

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use xiao_recorder::protocol::{capture, CaptureError, HeaderWait};
use xiao_recorder::transport::Transport;

/// In-memory board: each read returns (part of) the next scripted chunk
struct ScriptedBoard {
    stale: Vec<u8>,
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
    timeout: Option<Duration>,
    written: Vec<u8>,
    clears: usize,
}

impl ScriptedBoard {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            stale: Vec::new(),
            chunks: VecDeque::new(),
            closed: false,
            timeout,
            written: Vec::new(),
            clears: 0,
        }
    }

    fn reply(mut self, chunk: &[u8]) -> Self {
        self.chunks.push_back(chunk.to_vec());
        self
    }

    fn samples(self, samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.reply(&bytes)
    }

    fn stale(mut self, bytes: &[u8]) -> Self {
        self.stale = bytes.to_vec();
        self
    }

    /// Reads return 0 once the script is exhausted
    fn then_close(mut self) -> Self {
        self.closed = true;
        self
    }
}

impl Transport for ScriptedBoard {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clears += 1;
        self.stale.clear();
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.stale.is_empty() {
            let n = self.stale.len().min(buf.len());
            buf[..n].copy_from_slice(&self.stale[..n]);
            self.stale.drain(..n);
            return Ok(n);
        }
        let Some(mut chunk) = self.chunks.pop_front() else {
            if self.closed {
                return Ok(0);
            }
            if let Some(timeout) = self.timeout {
                thread::sleep(timeout.min(Duration::from_millis(20)));
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

#[test]
fn four_samples_after_ack() {
    let mut board = ScriptedBoard::new(Some(Duration::from_millis(1500)))
        .reply(b"ACK\n")
        .reply(b"DATA,4\n")
        .samples(&[1, -2, 3, -4]);

    let samples = capture(&mut board, 4, 1.0).unwrap();

    assert_eq!(samples, vec![1, -2, 3, -4]);
    assert_eq!(board.written, b"REC,4,4\n");
    assert_eq!(board.timeout, Some(Duration::from_millis(1500)));
}

#[test]
fn unset_timeout_stays_unset() {
    let mut board = ScriptedBoard::new(None)
        .reply(b"ACK\n")
        .reply(b"DATA,4\n")
        .samples(&[1, -2, 3, -4]);

    let samples = capture(&mut board, 4, 1.0).unwrap();

    assert_eq!(samples, vec![1, -2, 3, -4]);
    assert_eq!(board.timeout, None);
}

#[test]
fn ack_lines_do_not_change_the_result() {
    let payload: Vec<i16> = (0..100).map(|i| (i * 331 - 16000) as i16).collect();

    let mut plain = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,100\n")
        .samples(&payload);
    let mut acked = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"\r\n")
        .reply(b"REC ACK\r\n")
        .reply(b"ACK\n")
        .reply(b"DATA,100\r\n")
        .samples(&payload);

    let a = capture(&mut plain, 8000, 0.0125).unwrap();
    let b = capture(&mut acked, 8000, 0.0125).unwrap();

    assert_eq!(a, payload);
    assert_eq!(a, b);
}

#[test]
fn declared_count_overrides_request() {
    let mut fewer = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,3\n")
        .samples(&[7, 8, 9]);
    assert_eq!(capture(&mut fewer, 8000, 0.001).unwrap(), vec![7, 8, 9]);
    assert_eq!(fewer.written, b"REC,8000,8\n");

    let mut more = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,6\n")
        .samples(&[1, 2, 3, 4, 5, 6]);
    assert_eq!(capture(&mut more, 4, 1.0).unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn payload_in_the_header_chunk_is_kept() {
    let mut bytes = b"ACK\nDATA,2\n".to_vec();
    bytes.extend_from_slice(&i16::MAX.to_le_bytes());
    bytes.extend_from_slice(&i16::MIN.to_le_bytes());
    bytes.extend_from_slice(b"DONE\n");
    let mut board = ScriptedBoard::new(Some(Duration::from_secs(2))).reply(&bytes);

    assert_eq!(capture(&mut board, 4, 0.5).unwrap(), vec![i16::MAX, i16::MIN]);
}

#[test]
fn stale_input_is_discarded_before_the_command() {
    let mut board = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .stale(b"\x13\x37garbage from last time")
        .reply(b"DATA,1\n")
        .samples(&[42]);

    assert_eq!(capture(&mut board, 4, 0.25).unwrap(), vec![42]);
    assert_eq!(board.clears, 1);
}

#[test]
fn trailer_is_optional() {
    let mut with = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,1\n")
        .samples(&[-1])
        .reply(b"DONE\n");
    let mut without = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,1\n")
        .samples(&[-1]);

    assert_eq!(capture(&mut with, 4, 0.25).unwrap(), vec![-1]);
    assert_eq!(capture(&mut without, 4, 0.25).unwrap(), vec![-1]);
    assert_eq!(with.timeout, Some(Duration::from_secs(2)));
    assert_eq!(without.timeout, Some(Duration::from_secs(2)));
}

#[test]
fn unexpected_line_fails_and_restores_timeout() {
    let mut board = ScriptedBoard::new(Some(Duration::from_millis(700)))
        .reply(b"ACK\n")
        .reply(b"ERR,busy\n")
        .reply(b"DATA,1\n")
        .samples(&[1]);

    let err = capture(&mut board, 8000, 1.0).unwrap_err();

    assert!(matches!(err, CaptureError::UnexpectedHeader(ref line) if line == "ERR,busy"));
    assert_eq!(err.to_string(), "Unexpected header from device: \"ERR,busy\"");
    assert_eq!(board.timeout, Some(Duration::from_millis(700)));
}

#[test]
fn malformed_header_leaves_payload_unread() {
    let mut board = ScriptedBoard::new(None)
        .reply(b"DATA,lots\n")
        .samples(&[1, 2, 3]);

    let err = capture(&mut board, 4, 1.0).unwrap_err();

    assert!(matches!(err, CaptureError::MalformedHeader(ref h) if h == "DATA,lots"));
    assert_eq!(board.chunks.len(), 1);
    assert_eq!(board.timeout, None);
}

#[test]
fn closed_link_mid_payload_is_truncated() {
    let mut board = ScriptedBoard::new(Some(Duration::from_secs(2)))
        .reply(b"DATA,4\n")
        .samples(&[1, 2])
        .then_close();

    let err = capture(&mut board, 4, 1.0).unwrap_err();

    assert!(matches!(
        err,
        CaptureError::TruncatedPayload { received: 4, expected: 8 }
    ));
    assert_eq!(board.timeout, Some(Duration::from_secs(2)));
}

#[test]
fn silent_device_times_out_after_the_floor_budget() {
    let mut board = ScriptedBoard::new(Some(Duration::from_millis(50))).reply(b"\n");
    let started = Instant::now();

    let err = capture(&mut board, 8000, 0.5).unwrap_err();

    assert!(matches!(err, CaptureError::HeaderTimeout(HeaderWait::OnlyBlank)));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(board.timeout, Some(Duration::from_millis(50)));
}

#[test]
fn ack_without_header_times_out() {
    let mut board = ScriptedBoard::new(Some(Duration::from_millis(50))).reply(b"ACK\n");

    let err = capture(&mut board, 8000, 4.0).unwrap_err();

    assert!(matches!(err, CaptureError::HeaderTimeout(HeaderWait::AfterAck)));
    assert_eq!(err.to_string(), "Device did not send DATA header after ACK.");
}
