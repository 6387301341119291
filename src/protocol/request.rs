//! Capture request sent to the board

use std::time::Duration;
use thiserror::Error;

/// Highest sample rate the board firmware accepts (Hz)
pub const DEVICE_MAX_SAMPLE_RATE: u32 = 8000;

/// Lowest sample rate offered by the UI (Hz)
pub const MIN_SAMPLE_RATE: u32 = 4000;

/// Minimum time granted to the device to answer with a DATA header
pub const HEADER_WAIT_FLOOR: Duration = Duration::from_secs(5);

/// Slack added on top of the capture duration before giving up on the header
pub const HEADER_WAIT_SLACK: Duration = Duration::from_secs(2);

/// Largest sample count a single capture may ask for or declare (about 35 min at 8 kHz)
pub const MAX_SAMPLE_COUNT: usize = 1 << 24;

/// Parameters that cannot be turned into a `REC` command
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RequestError {
    #[error("Sample rate must be greater than zero.")]
    ZeroSampleRate,

    #[error("Duration must be greater than zero (got {0}).")]
    InvalidDuration(f64),

    #[error("Capture of {count:.0} samples exceeds the limit of {limit}.")]
    TooManySamples { count: f64, limit: usize },
}

/// One `REC` command: sample rate plus the number of samples asked for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    sample_rate: u32,
    duration_secs: f64,
    sample_count: usize,
}

impl CaptureRequest {
    /// Builds a request for `duration_secs` seconds at `sample_rate` Hz.
    ///
    /// The sample count is `round(sample_rate * duration_secs)`. The duration
    /// must be finite and positive, and the count at most [`MAX_SAMPLE_COUNT`].
    pub fn new(sample_rate: u32, duration_secs: f64) -> Result<Self, RequestError> {
        if sample_rate == 0 {
            return Err(RequestError::ZeroSampleRate);
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(RequestError::InvalidDuration(duration_secs));
        }
        let count = (sample_rate as f64 * duration_secs).round();
        if count > MAX_SAMPLE_COUNT as f64 {
            return Err(RequestError::TooManySamples {
                count,
                limit: MAX_SAMPLE_COUNT,
            });
        }

        Ok(Self {
            sample_rate,
            duration_secs,
            sample_count: count as usize,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// ASCII command line, newline terminated
    pub fn command_line(&self) -> Vec<u8> {
        format!("REC,{},{}\n", self.sample_rate, self.sample_count).into_bytes()
    }

    /// How long the header phase may last: `max(5 s, duration + 2 s)`
    pub fn wait_budget(&self) -> Duration {
        // Bounded by MAX_SAMPLE_COUNT seconds at 1 Hz
        Duration::from_secs_f64(self.duration_secs)
            .saturating_add(HEADER_WAIT_SLACK)
            .max(HEADER_WAIT_FLOOR)
    }
}
