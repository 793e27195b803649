//! Sample store
//!
//! Loads the chime into memory once at startup. Whatever the file's
//! native channel count and sample encoding, the result is interleaved
//! 16-bit stereo at exactly 44.1 kHz. Resampling is never attempted.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::constants::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::error::FormatError;

/// Immutable, fully decoded PCM buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Interleaved stereo samples
    data: Vec<i16>,
    /// Frame count (one frame = one sample per channel)
    frames: usize,
    rate: u32,
}

impl Sample {
    /// Build a sample from already interleaved 16-bit stereo data
    pub fn from_interleaved(data: Vec<i16>, rate: u32) -> Result<Self, FormatError> {
        if rate != OUTPUT_SAMPLE_RATE {
            return Err(FormatError::UnsupportedRate { found: rate });
        }
        let channels = OUTPUT_CHANNELS as usize;
        if data.len() % channels != 0 {
            return Err(FormatError::UnsupportedFormat(format!(
                "{} samples do not form whole stereo frames",
                data.len()
            )));
        }
        if data.is_empty() {
            return Err(FormatError::Empty);
        }

        let frames = data.len() / channels;
        Ok(Self { data, frames, rate })
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Total sample count (`channels * frames`), the unit the device queue uses
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    pub fn channels(&self) -> u16 {
        OUTPUT_CHANNELS
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.data
    }

    /// Size of the buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<i16>()
    }

    /// Playback duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.rate as f64)
    }
}

/// Load a WAV file into a [`Sample`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<Sample, FormatError> {
    let path = path.as_ref();
    let open_err = |reason: String| FormatError::Open {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = hound::WavReader::open(path).map_err(|e| open_err(e.to_string()))?;
    let spec = reader.spec();

    debug!(
        path = %path.display(),
        channels = spec.channels,
        rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        format = ?spec.sample_format,
        "Opened sample"
    );

    // The port always runs at this rate
    if spec.sample_rate != OUTPUT_SAMPLE_RATE {
        return Err(FormatError::UnsupportedRate {
            found: spec.sample_rate,
        });
    }
    if spec.channels == 0 {
        return Err(FormatError::UnsupportedFormat("zero channels".to_string()));
    }

    let frames = reader.duration() as usize;
    let expected = frames * spec.channels as usize;

    let native = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits @ 1..=32) => {
            let mut out = Vec::with_capacity(expected);
            for s in reader.samples::<i32>() {
                let s = s.map_err(|e| open_err(e.to_string()))?;
                out.push(int_to_i16(s, bits));
            }
            out
        }
        (hound::SampleFormat::Float, 32) => {
            let mut out = Vec::with_capacity(expected);
            for s in reader.samples::<f32>() {
                let s = s.map_err(|e| open_err(e.to_string()))?;
                out.push(float_to_i16(s));
            }
            out
        }
        (format, bits) => {
            return Err(FormatError::UnsupportedFormat(format!(
                "{:?} at {} bits",
                format, bits
            )))
        }
    };

    if native.len() != expected {
        return Err(FormatError::Truncated {
            expected,
            found: native.len(),
        });
    }

    let data = to_stereo(native, spec.channels);
    let sample = Sample::from_interleaved(data, spec.sample_rate)?;

    info!(
        path = %path.display(),
        frames = sample.frames(),
        samples = sample.sample_count(),
        bytes = sample.byte_len(),
        "Loaded sample"
    );

    Ok(sample)
}

/// Rescale a signed integer sample of `bits` width to 16 bits
fn int_to_i16(value: i32, bits: u16) -> i16 {
    if bits <= 16 {
        (value << (16 - bits)) as i16
    } else {
        (value >> (bits - 16)) as i16
    }
}

fn float_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Interleave any channel count into stereo frames.
///
/// Mono is duplicated to both sides; extra channels beyond the first
/// two are dropped.
fn to_stereo(native: Vec<i16>, channels: u16) -> Vec<i16> {
    match channels {
        2 => native,
        1 => native.iter().flat_map(|&s| [s, s]).collect(),
        n => native
            .chunks_exact(n as usize)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
