//! Application state and the handlers behind every button
//!
//! Kept free of egui so the logic can be driven directly in tests; the
//! widgets in `gui` only read from and call into [`AppState`].

use crate::audio::{peak_amplitude, plot_points, save_wav, Player, DEFAULT_PLOT_BUCKETS};
use crate::config::{clamp_sample_rate, validate_duration, AppConfig};
use crate::recorder::{CaptureOutcome, Recorder, RecorderError};
use crate::transport::{PortBackend, PortInfo};
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

/// RGB color of an indicator dot
pub type Rgb = [u8; 3];

const RECORD_IDLE: Rgb = [110, 150, 210];
const RECORD_SUCCESS: Rgb = [120, 210, 150];
const RECORD_ERROR: Rgb = [230, 140, 90];
const RECORD_RECORDING: Rgb = [120, 200, 255];
const CONN_CONNECTED: Rgb = [110, 200, 150];
const CONN_DISCONNECTED: Rgb = [200, 90, 90];
const CONN_CONNECTED_MIX: Rgb = [180, 235, 200];
const CONN_DISCONNECTED_MIX: Rgb = [255, 160, 160];

const SUCCESS_FLASH: Duration = Duration::from_millis(1500);
const ERROR_FLASH: Duration = Duration::from_secs(2);

/// Session indicator shown next to the record button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVisual {
    Idle,
    Recording,
    Captured,
    Error,
}

impl RecordVisual {
    pub fn label(&self) -> &'static str {
        match self {
            RecordVisual::Idle => "Idle",
            RecordVisual::Recording => "Recording…",
            RecordVisual::Captured => "Captured",
            RecordVisual::Error => "Error",
        }
    }

    fn color(&self) -> Rgb {
        match self {
            RecordVisual::Idle => RECORD_IDLE,
            RecordVisual::Recording => RECORD_RECORDING,
            RecordVisual::Captured => RECORD_SUCCESS,
            RecordVisual::Error => RECORD_ERROR,
        }
    }
}

/// Last successful capture
#[derive(Debug, Clone)]
pub struct Capture {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Decimated (time, amplitude) points for the waveform plot
    pub plot: Vec<[f64; 2]>,
    /// Largest absolute sample value
    pub peak: u16,
}

/// Post-capture fade of the record indicator back to idle
#[derive(Debug, Clone, Copy)]
struct Flash {
    until: Instant,
    duration: Duration,
    color: Rgb,
}

/// Everything the window shows, plus the handles doing the work
pub struct AppState {
    pub config: AppConfig,
    /// Sample rate field (Hz); clamped when a capture starts
    pub sample_rate_input: i32,
    /// Duration field (s)
    pub duration_input: f64,
    /// Index into [`AppState::ports`]
    pub selected_port: Option<usize>,

    backend: Box<dyn PortBackend>,
    recorder: Recorder,
    player: Player,
    ports: Vec<PortInfo>,
    connected_label: Option<String>,
    status: String,
    capture: Option<Capture>,

    record_visual: RecordVisual,
    record_started: Instant,
    record_duration: f64,
    record_pulse: f32,
    conn_pulse: f32,
    flash: Option<Flash>,
    last_frame: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Box<dyn PortBackend>, recorder: Recorder) -> Self {
        let now = Instant::now();
        let mut state = Self {
            sample_rate_input: config.sample_rate.min(i32::MAX as u32) as i32,
            duration_input: config.duration_secs,
            selected_port: None,
            config,
            backend,
            recorder,
            player: Player::new(),
            ports: Vec::new(),
            connected_label: None,
            status: "Idle".to_string(),
            capture: None,
            record_visual: RecordVisual::Idle,
            record_started: now,
            record_duration: 0.0,
            record_pulse: 0.0,
            conn_pulse: 0.0,
            flash: None,
            last_frame: now,
        };
        state.load_ports();
        state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        tracing::debug!("Status: {}", self.status);
    }

    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.recorder.is_connected()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// "Connected (<port>)" or "Disconnected"
    pub fn connection_label(&self) -> String {
        match (&self.connected_label, self.is_connected()) {
            (Some(label), true) => format!("Connected ({})", label),
            (None, true) => "Connected".to_string(),
            (_, false) => "Disconnected".to_string(),
        }
    }

    pub fn record_visual(&self) -> RecordVisual {
        self.record_visual
    }

    /// Fraction of the requested duration elapsed, while a capture runs.
    ///
    /// Capped below 1.0 since the device still has to send the data.
    pub fn record_progress(&self, now: Instant) -> Option<f32> {
        if !self.is_recording() {
            return None;
        }
        let progress = if self.record_duration > 0.0 {
            now.saturating_duration_since(self.record_started).as_secs_f64() / self.record_duration
        } else {
            0.0
        };
        Some(progress.clamp(0.0, 0.99) as f32)
    }

    fn load_ports(&mut self) -> bool {
        match self.backend.list_ports() {
            Ok(ports) => {
                self.selected_port = self
                    .config
                    .last_port
                    .as_ref()
                    .and_then(|last| ports.iter().position(|p| &p.device == last))
                    .or(if ports.is_empty() { None } else { Some(0) });
                self.ports = ports;
                true
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.set_status(e.to_string());
                false
            }
        }
    }

    /// "Refresh" button
    pub fn refresh_ports(&mut self) {
        if self.load_ports() {
            self.set_status("Ports refreshed.");
        }
    }

    /// "Connect" button
    pub fn connect(&mut self) {
        if self.is_connected() {
            self.set_status("Already connected.");
            return;
        }
        if self.is_recording() {
            // The previous port closes once its capture returns
            self.set_status(RecorderError::AlreadyRecording.to_string());
            return;
        }
        let Some(port) = self.selected_port.and_then(|idx| self.ports.get(idx)).cloned() else {
            self.set_status("Select a serial port first.");
            return;
        };

        match self.backend.open(&port.device) {
            Ok(transport) => match self.recorder.connect(transport) {
                Ok(()) => {
                    self.connected_label = Some(port.label());
                    self.config.last_port = Some(port.device.clone());
                    self.set_status(format!("Connected to {}.", port.device));
                }
                Err(e) => self.set_status(e.to_string()),
            },
            Err(e) => {
                tracing::error!("{}", e);
                self.connected_label = None;
                self.set_status(e.to_string());
            }
        }
    }

    /// "Disconnect" button
    pub fn disconnect(&mut self) {
        if self.recorder.disconnect() {
            self.set_status("Disconnected.");
        }
        self.connected_label = None;
    }

    /// "Record" button
    pub fn record(&mut self, now: Instant) {
        if self.is_recording() {
            self.set_status(RecorderError::AlreadyRecording.to_string());
            return;
        }
        if !self.is_connected() {
            self.set_status(RecorderError::NotConnected.to_string());
            return;
        }

        let requested = self.sample_rate_input.max(0) as u32;
        let sample_rate = clamp_sample_rate(requested);
        if requested != sample_rate {
            self.sample_rate_input = sample_rate as i32;
        }

        let duration = match validate_duration(self.duration_input) {
            Ok(duration) => duration,
            Err(reset) => {
                self.duration_input = reset;
                self.set_status("Duration must be greater than zero.");
                return;
            }
        };

        if let Err(e) = self.recorder.start_capture(sample_rate, duration) {
            self.set_status(e.to_string());
            return;
        }

        self.config.sample_rate = sample_rate;
        self.config.duration_secs = duration;
        self.record_visual = RecordVisual::Recording;
        self.record_started = now;
        self.record_duration = duration;
        self.record_pulse = 0.0;
        self.flash = None;

        if requested != sample_rate {
            self.set_status(format!("Recording {:.2}s at {} Hz (device limit).", duration, sample_rate));
        } else {
            self.set_status(format!("Recording {:.2}s at {} Hz…", duration, sample_rate));
        }
    }

    /// "Play" button
    pub fn play(&mut self) {
        let Some(capture) = &self.capture else {
            self.set_status("Nothing to play. Record first.");
            return;
        };
        match self.player.play(&capture.samples, capture.sample_rate) {
            Ok(()) => self.set_status("Playing…"),
            Err(e) => self.set_status(format!("Playback error: {}", e)),
        }
    }

    /// "Save WAV" button
    pub fn save(&mut self) {
        let Some(capture) = &self.capture else {
            self.set_status("Nothing to save. Record first.");
            return;
        };
        match save_wav(&self.config.output_dir, &capture.samples, capture.sample_rate) {
            Ok(path) => self.set_status(format!("Saved {}", path.display())),
            Err(e) => {
                tracing::error!("{}", e);
                self.set_status(format!("Save error: {}", e));
            }
        }
    }

    /// "Clear" button
    pub fn clear(&mut self) {
        self.capture = None;
        self.player.stop();
        self.record_visual = RecordVisual::Idle;
        self.flash = None;
        self.set_status("Cleared.");
    }

    /// Once per frame: collects a finished capture and advances the animations
    pub fn tick(&mut self, now: Instant) {
        while let Some(outcome) = self.recorder.poll() {
            self.finish_recording(outcome, now);
        }

        let dt = now.saturating_duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.is_recording() {
            self.record_pulse = (self.record_pulse + dt * 3.2) % TAU;
        }
        let speed = if self.is_connected() { 1.25 } else { 0.8 };
        self.conn_pulse = (self.conn_pulse + dt * speed) % TAU;

        if self.flash.is_some_and(|flash| flash.until <= now) {
            self.flash = None;
        }
    }

    fn finish_recording(&mut self, outcome: CaptureOutcome, now: Instant) {
        self.record_duration = 0.0;
        if !self.is_connected() {
            self.connected_label = None;
        }

        match outcome.result {
            Ok(samples) => {
                let count = samples.len();
                let plot = plot_points(&samples, outcome.sample_rate, DEFAULT_PLOT_BUCKETS);
                let peak = peak_amplitude(&samples);
                tracing::debug!("Capture peak amplitude {}", peak);
                self.capture = Some(Capture {
                    samples,
                    sample_rate: outcome.sample_rate,
                    plot,
                    peak,
                });
                self.show_result(RecordVisual::Captured, SUCCESS_FLASH, now);
                self.set_status(format!("Received {} samples.", count));
            }
            Err(e) => {
                self.show_result(RecordVisual::Error, ERROR_FLASH, now);
                self.set_status(format!("Record error: {}", e));
            }
        }
    }

    fn show_result(&mut self, visual: RecordVisual, duration: Duration, now: Instant) {
        self.record_visual = visual;
        self.flash = Some(Flash {
            until: now + duration,
            duration,
            color: visual.color(),
        });
    }

    /// Color of the session dot: pulsing while recording, fading after a result
    pub fn record_indicator(&self, now: Instant) -> Rgb {
        if self.is_recording() {
            let intensity = 0.5 + 0.5 * self.record_pulse.sin();
            return mix(RECORD_RECORDING, [255, 255, 255], intensity * 0.6);
        }
        match self.flash {
            Some(flash) if flash.until > now => {
                let left = flash.until.saturating_duration_since(now).as_secs_f32();
                let ratio = (left / flash.duration.as_secs_f32()).clamp(0.0, 1.0);
                mix(RECORD_IDLE, flash.color, ratio)
            }
            _ => RECORD_IDLE,
        }
    }

    /// Color of the connection dot, gently pulsing
    pub fn connection_indicator(&self) -> Rgb {
        let (base, target) = if self.is_connected() {
            (CONN_CONNECTED, CONN_CONNECTED_MIX)
        } else {
            (CONN_DISCONNECTED, CONN_DISCONNECTED_MIX)
        };
        let wave = 0.5 + 0.5 * self.conn_pulse.sin();
        mix(base, target, wave * 0.6)
    }

    /// Writes the current settings back to disk
    pub fn persist(&mut self) {
        if let Ok(duration) = validate_duration(self.duration_input) {
            self.config.duration_secs = duration;
        }
        self.config.sample_rate = clamp_sample_rate(self.sample_rate_input.max(0) as u32);
        self.config.save();
    }
}

/// Linear blend from `from` towards `to`, `amount` in [0, 1]
fn mix(from: Rgb, to: Rgb, amount: f32) -> Rgb {
    let mut out = [0u8; 3];
    for i in 0..3 {
        let a = from[i] as f32;
        let b = to[i] as f32;
        out[i] = (a + (b - a) * amount).clamp(0.0, 255.0) as u8;
    }
    out
}
