//! Playback of a captured buffer on the default output device
//!
//! Uses cpal for cross-platform output and ringbuf to feed the stream.
//! The stream lives in a dedicated thread since cpal streams are not `Send`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use ringbuf::{traits::*, HeapCons, HeapRb};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Ring buffer size, in seconds of device audio
const RING_SECONDS: usize = 1;

/// How often the feeder thread tops up the ring buffer
const FEED_INTERVAL: Duration = Duration::from_millis(20);

/// Playback errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Nothing to play")]
    Empty,
}

/// Commands to control the playback thread
enum PlaybackCommand {
    Stop,
}

/// Handle to a clip being played
struct PlaybackHandle {
    command_tx: mpsc::Sender<PlaybackCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Starts playing `samples` in a dedicated thread; returns once the stream runs
    fn start(samples: Vec<i16>, sample_rate: u32) -> Result<Self, PlaybackError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_handle = thread::spawn(move || {
            if let Err(e) = run_playback(samples, sample_rate, command_rx, &ready_tx) {
                tracing::error!("Playback error: {}", e);
                let _ = ready_tx.send(Err(e));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                command_tx,
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(PlaybackError::StreamError("playback thread exited".into()))
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    fn stop(&mut self) {
        let _ = self.command_tx.send(PlaybackCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Plays one clip at a time; a new clip replaces the one playing
#[derive(Default)]
pub struct Player {
    current: Option<PlaybackHandle>,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops any clip in progress and starts `samples` (mono, `sample_rate` Hz)
    pub fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<(), PlaybackError> {
        if samples.is_empty() {
            return Err(PlaybackError::Empty);
        }
        self.stop();
        self.current = Some(PlaybackHandle::start(samples.to_vec(), sample_rate)?);
        Ok(())
    }

    /// Stops playback, if any
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Converts a signed 16-bit sample to [-1.0, 1.0)
fn to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Simple linear resample from source_rate to target_rate
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx_floor = (src_idx.floor() as usize).min(samples.len() - 1);
        let idx_ceil = (idx_floor + 1).min(samples.len() - 1);
        let frac = (src_idx - idx_floor as f64) as f32;

        output.push(samples[idx_floor] * (1.0 - frac) + samples[idx_ceil] * frac);
    }

    output
}

/// Duplicates each mono sample across `channels` interleaved channels
fn mono_to_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
        .collect()
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let sample = consumer.try_pop().unwrap_or(0.0);
                    *out = T::from_sample(sample);
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| PlaybackError::StreamError(e.to_string()))
}

/// Run playback (in a dedicated thread)
fn run_playback(
    samples: Vec<i16>,
    sample_rate: u32,
    command_rx: mpsc::Receiver<PlaybackCommand>,
    ready_tx: &mpsc::Sender<Result<(), PlaybackError>>,
) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    tracing::info!("Audio output device: {:?}", device.name());

    let supported_config = device
        .default_output_config()
        .map_err(|e| PlaybackError::ConfigError(e.to_string()))?;

    let device_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels();
    let sample_format = supported_config.sample_format();

    tracing::info!(
        "Playback: {}Hz mono -> {}Hz {}ch ({:?})",
        sample_rate,
        device_rate,
        channels,
        sample_format
    );

    let mono: Vec<f32> = samples.iter().copied().map(to_f32).collect();
    let output = mono_to_interleaved(&resample(&mono, sample_rate, device_rate), channels);

    let capacity = device_rate as usize * channels as usize * RING_SECONDS;
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (mut producer, consumer) = rb.split();

    let mut fed = producer.push_slice(&output);

    let stream_config: cpal::StreamConfig = supported_config.into();
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, consumer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, consumer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, consumer)?,
        other => {
            return Err(PlaybackError::ConfigError(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| PlaybackError::StreamError(e.to_string()))?;

    let _ = ready_tx.send(Ok(()));
    tracing::info!("Playback started ({} frames)", output.len() / channels.max(1) as usize);

    loop {
        if fed < output.len() {
            fed += producer.push_slice(&output[fed..]);
        } else if producer.is_empty() {
            tracing::info!("Playback finished");
            break;
        }

        match command_rx.recv_timeout(FEED_INTERVAL) {
            Ok(PlaybackCommand::Stop) => {
                tracing::info!("Playback stopped");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
