//! Capture scheduling between the UI thread and the serial link

mod worker;

pub use worker::{CaptureOutcome, Recorder, RecorderError};
