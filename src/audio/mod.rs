//! Audio handling for captured buffers
//!
//! Playback on the default output device, WAV export and plot data.

mod playback;
mod wav;
mod waveform;

pub use playback::{PlaybackError, Player};
pub use wav::{save_wav, wav_file_name, write_wav, WavError};
pub use waveform::{peak_amplitude, plot_points, DEFAULT_PLOT_BUCKETS};
