//! Background capture worker
//!
//! Each capture runs on tokio's blocking pool. The transport moves into the
//! worker and comes back with the result through a single-slot channel, so
//! the UI thread never touches the port while a capture is running.

use crate::protocol::{capture, CaptureError};
use crate::transport::Transport;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Not connected.")]
    NotConnected,

    #[error("Already connected.")]
    AlreadyConnected,

    #[error("Recording already in progress.")]
    AlreadyRecording,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Capture worker stopped unexpectedly; serial port closed.")]
    WorkerLost,
}

/// Result of one capture, as delivered to the UI
#[derive(Debug)]
pub struct CaptureOutcome {
    pub sample_rate: u32,
    pub result: Result<Vec<i16>, RecorderError>,
}

/// What the worker hands back: the outcome plus the transport, if it survived
struct Completed {
    transport: Option<Box<dyn Transport>>,
    outcome: CaptureOutcome,
}

enum Connection {
    Closed,
    Idle(Box<dyn Transport>),
    Busy,
}

/// Owns the connection and runs at most one capture at a time
pub struct Recorder {
    runtime: Handle,
    connection: Connection,
    close_when_done: bool,
    result_tx: mpsc::Sender<Completed>,
    result_rx: mpsc::Receiver<Completed>,
}

impl Recorder {
    /// Creates a recorder whose captures run on `runtime`
    pub fn new(runtime: Handle) -> Self {
        let (result_tx, result_rx) = mpsc::channel(1);
        Self {
            runtime,
            connection: Connection::Closed,
            close_when_done: false,
            result_tx,
            result_rx,
        }
    }

    /// Takes ownership of an open transport.
    ///
    /// Refused while a capture still holds the previous transport, even after
    /// a disconnect, so that only one capture is ever in flight.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> Result<(), RecorderError> {
        match self.connection {
            Connection::Idle(_) => return Err(RecorderError::AlreadyConnected),
            Connection::Busy if !self.close_when_done => return Err(RecorderError::AlreadyConnected),
            Connection::Busy => return Err(RecorderError::AlreadyRecording),
            Connection::Closed => {}
        }
        self.connection = Connection::Idle(transport);
        self.close_when_done = false;
        Ok(())
    }

    /// Closes the transport; a running capture keeps it until it finishes.
    ///
    /// Returns whether a connection was open.
    pub fn disconnect(&mut self) -> bool {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Closed => false,
            Connection::Idle(transport) => {
                drop(transport);
                true
            }
            Connection::Busy => {
                self.connection = Connection::Busy;
                self.close_when_done = true;
                tracing::info!("Disconnect requested during capture, closing when it ends");
                true
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.connection {
            Connection::Closed => false,
            Connection::Busy => !self.close_when_done,
            Connection::Idle(_) => true,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.connection, Connection::Busy)
    }

    /// Starts a capture in the background; rejected if one is already running
    pub fn start_capture(&mut self, sample_rate: u32, duration_secs: f64) -> Result<(), RecorderError> {
        let mut transport = match std::mem::replace(&mut self.connection, Connection::Busy) {
            Connection::Idle(transport) => transport,
            Connection::Busy => return Err(RecorderError::AlreadyRecording),
            Connection::Closed => {
                self.connection = Connection::Closed;
                return Err(RecorderError::NotConnected);
            }
        };

        tracing::info!("Starting capture: {:.2}s at {} Hz", duration_secs, sample_rate);

        let result_tx = self.result_tx.clone();
        self.runtime.spawn(async move {
            let job = tokio::task::spawn_blocking(move || {
                let result = capture(&mut transport, sample_rate, duration_secs);
                (transport, result)
            });

            let completed = match job.await {
                Ok((transport, result)) => Completed {
                    transport: Some(transport),
                    outcome: CaptureOutcome {
                        sample_rate,
                        result: result.map_err(RecorderError::from),
                    },
                },
                Err(e) => {
                    tracing::error!("Capture worker failed: {}", e);
                    Completed {
                        transport: None,
                        outcome: CaptureOutcome {
                            sample_rate,
                            result: Err(RecorderError::WorkerLost),
                        },
                    }
                }
            };

            if result_tx.send(completed).await.is_err() {
                tracing::warn!("Capture finished after the recorder was dropped");
            }
        });

        Ok(())
    }

    /// Returns the finished capture, if any, without blocking
    pub fn poll(&mut self) -> Option<CaptureOutcome> {
        let completed = self.result_rx.try_recv().ok()?;

        self.connection = match completed.transport {
            Some(transport) if !self.close_when_done => Connection::Idle(transport),
            _ => Connection::Closed,
        };
        self.close_when_done = false;

        match &completed.outcome.result {
            Ok(samples) => tracing::info!("Capture done: {} samples", samples.len()),
            Err(e) => tracing::warn!("Capture failed: {}", e),
        }
        Some(completed.outcome)
    }
}
