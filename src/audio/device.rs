//! Audio output device abstraction and the cpal-backed implementation
//!
//! A device owns process-wide parameters (output rate, channel mode) and
//! opens write ports. A port wraps a [`SampleQueue`] that the hardware
//! drains on its own clock.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::audio::queue::{Readiness, SampleQueue};
use crate::constants::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE, SAMPLE_WIDTH_BITS};
use crate::error::AudioError;

/// Channel layout of a port; samples are always stereo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Stereo,
}

impl ChannelLayout {
    pub fn channels(self) -> u16 {
        match self {
            ChannelLayout::Stereo => OUTPUT_CHANNELS,
        }
    }
}

/// Port configuration, built by the device and adjusted before opening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Sample width in bits
    pub width: u16,
    /// Channel count the hardware stream is opened with
    pub channels: u16,
    /// Queue size in samples
    pub queue_size: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            width: SAMPLE_WIDTH_BITS,
            channels: OUTPUT_CHANNELS,
            queue_size: OUTPUT_SAMPLE_RATE as usize,
        }
    }
}

/// Audio device collaborator
pub trait OutputDevice {
    type Port: OutputPort;

    fn name(&self) -> String;

    /// Current channel mode of the device (channel count)
    fn channel_mode(&self) -> Result<u16, AudioError>;

    /// Set the device-wide output rate
    fn set_output_rate(&mut self, rate: u32) -> Result<(), AudioError>;

    /// Fresh port configuration with device defaults
    fn new_config(&self) -> PortConfig;

    /// Set the channel layout on `config`; leaves it unchanged on failure
    fn set_channels(&self, config: &mut PortConfig, layout: ChannelLayout)
        -> Result<(), AudioError>;

    /// Open a write port. Dropping the port closes it.
    fn open_port(&mut self, config: &PortConfig) -> Result<Self::Port, AudioError>;
}

/// Write endpoint of an open port
pub trait OutputPort {
    /// Enqueue interleaved samples; fails rather than blocking when the
    /// queue lacks room
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;

    /// Enqueue interleaved samples, blocking until the queue has room
    fn write_blocking(&mut self, samples: &[i16]) -> Result<(), AudioError>;

    /// Samples currently queued
    fn filled(&self) -> usize;

    fn set_fill_point(&mut self, fill_point: usize) -> Result<(), AudioError>;

    fn readiness(&self) -> Readiness;
}

/// cpal output device
pub struct CpalOutput {
    inner: cpal::Device,
    name: String,
    output_rate: u32,
}

impl CpalOutput {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
            output_rate: OUTPUT_SAMPLE_RATE,
        }
    }

    /// Open the named output device, or the host default when `name` is `None`
    pub fn open(name: Option<&str>) -> Result<Self, AudioError> {
        match name {
            Some(name) => get_output_device_by_name(name),
            None => get_default_output_device(),
        }
    }

    fn supports(&self, channels: u16, rate: u32) -> bool {
        let rate = cpal::SampleRate(rate);
        match self.inner.supported_output_configs() {
            Ok(configs) => configs.into_iter().any(|c| {
                c.channels() == channels
                    && rate >= c.min_sample_rate()
                    && rate <= c.max_sample_rate()
            }),
            Err(e) => {
                warn!("Failed to query output configs for {}: {}", self.name, e);
                false
            }
        }
    }
}

impl OutputDevice for CpalOutput {
    type Port = CpalPort;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn channel_mode(&self) -> Result<u16, AudioError> {
        self.inner
            .default_output_config()
            .map(|c| c.channels())
            .map_err(|e| AudioError::Config(e.to_string()))
    }

    fn set_output_rate(&mut self, rate: u32) -> Result<(), AudioError> {
        self.output_rate = rate;
        Ok(())
    }

    fn new_config(&self) -> PortConfig {
        PortConfig {
            channels: self.channel_mode().unwrap_or(OUTPUT_CHANNELS),
            ..PortConfig::default()
        }
    }

    fn set_channels(
        &self,
        config: &mut PortConfig,
        layout: ChannelLayout,
    ) -> Result<(), AudioError> {
        let channels = layout.channels();
        if !self.supports(channels, self.output_rate) {
            return Err(AudioError::ChannelLayout(format!(
                "{} does not support {} channels at {} Hz",
                self.name, channels, self.output_rate
            )));
        }
        config.channels = channels;
        Ok(())
    }

    fn open_port(&mut self, config: &PortConfig) -> Result<CpalPort, AudioError> {
        let supported = self
            .inner
            .default_output_config()
            .map_err(|e| AudioError::PortOpen(e.to_string()))?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(self.output_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::new(SampleQueue::new(config.queue_size));
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&self.inner, &stream_config, queue.clone(), error_tx)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&self.inner, &stream_config, queue.clone(), error_tx)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&self.inner, &stream_config, queue.clone(), error_tx)
            }
            other => {
                return Err(AudioError::PortOpen(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| AudioError::CpalError(e.to_string()))?;

        info!(
            device = %self.name,
            rate = self.output_rate,
            channels = config.channels,
            queue = config.queue_size,
            "Opened output port"
        );

        Ok(CpalPort {
            queue,
            _stream: stream,
            errors: error_rx,
        })
    }
}

/// Build an output stream that drains `queue`, mapping stereo frames
/// onto however many channels the stream was opened with
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    queue: Arc<SampleQueue>,
    errors: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    let out_channels = config.channels.max(1) as usize;
    let mut scratch: Vec<i16> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / out_channels;
                scratch.resize(frames * OUTPUT_CHANNELS as usize, 0);
                let n = queue.pop_into(&mut scratch);
                scratch[n..].fill(0);

                for (frame, src) in data
                    .chunks_exact_mut(out_channels)
                    .zip(scratch.chunks_exact(OUTPUT_CHANNELS as usize))
                {
                    if frame.len() == 1 {
                        let mixed = ((src[0] as i32 + src[1] as i32) / 2) as i16;
                        frame[0] = T::from_sample(mixed);
                    } else {
                        frame[0] = T::from_sample(src[0]);
                        frame[1] = T::from_sample(src[1]);
                        for extra in &mut frame[2..] {
                            *extra = T::EQUILIBRIUM;
                        }
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                let _ = errors.try_send(AudioError::Stream(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::PortOpen(e.to_string()))
}

/// Open cpal write port
pub struct CpalPort {
    queue: Arc<SampleQueue>,
    /// Kept alive for playback; dropping it closes the port
    _stream: cpal::Stream,
    errors: Receiver<AudioError>,
}

impl OutputPort for CpalPort {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }
        self.queue.push_all(samples)?;
        debug!(samples = samples.len(), "Queued samples");
        Ok(())
    }

    fn write_blocking(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }
        self.queue.push_all_blocking(samples)
    }

    fn filled(&self) -> usize {
        self.queue.filled()
    }

    fn set_fill_point(&mut self, fill_point: usize) -> Result<(), AudioError> {
        self.queue.set_fill_point(fill_point)
    }

    fn readiness(&self) -> Readiness {
        Readiness::new(self.queue.clone())
    }
}

/// Names of all output devices on the default host
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}

/// Get an output device by name
pub fn get_output_device_by_name(name: &str) -> Result<CpalOutput, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(CpalOutput::from_cpal(device));
            }
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Get default output device
pub fn get_default_output_device() -> Result<CpalOutput, AudioError> {
    let host = cpal::default_host();
    host.default_output_device()
        .map(CpalOutput::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_channels() {
        assert_eq!(ChannelLayout::Stereo.channels(), 2);
    }

    #[test]
    fn test_default_port_config() {
        let config = PortConfig::default();
        assert_eq!(config.width, 16);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_unknown_output_device() {
        let result = get_output_device_by_name("no such output device");
        assert!(matches!(result, Err(AudioError::DeviceNotFound(_))));
    }
}
