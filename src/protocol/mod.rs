//! Capture protocol spoken with the board over the serial link
//!
//! `REC,<rate>,<count>` goes out, optional `ACK` lines and a `DATA,<n>`
//! header come back, followed by `n` little-endian i16 samples.

mod header;
mod request;
mod session;

pub use header::HeaderLine;
pub use request::{
    CaptureRequest, RequestError, DEVICE_MAX_SAMPLE_RATE, HEADER_WAIT_FLOOR, HEADER_WAIT_SLACK,
    MAX_SAMPLE_COUNT, MIN_SAMPLE_RATE,
};
pub use session::{capture, CaptureError, CaptureSession, HeaderWait};
