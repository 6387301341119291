//! WAV export of captured buffers
//!
//! Mono, 16-bit PCM, written with hound.

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// WAV export errors
#[derive(Error, Debug)]
pub enum WavError {
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `xiao_mg24_audio_<YYYYMMDD_HHMMSS>.wav`
pub fn wav_file_name(at: &DateTime<Local>) -> String {
    format!("xiao_mg24_audio_{}.wav", at.format("%Y%m%d_%H%M%S"))
}

/// Saves `samples` under a timestamped name in `dir` and returns the file path
pub fn save_wav(dir: &Path, samples: &[i16], sample_rate: u32) -> Result<PathBuf, WavError> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| WavError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let path = dir.join(wav_file_name(&Local::now()));
    write_wav(&path, samples, sample_rate)?;
    Ok(path)
}

/// Writes `samples` as a mono 16-bit PCM file at `path`
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), WavError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let to_error = |source: hound::Error| WavError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WavWriter::create(path, spec).map_err(to_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(to_error)?;
    }
    writer.finalize().map_err(to_error)?;

    tracing::info!("Saved {} samples at {} Hz to {}", samples.len(), sample_rate, path.display());
    Ok(())
}
