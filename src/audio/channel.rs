//! Output channel: one open port sized to hold the whole sample

use tracing::{info, warn};

use crate::audio::device::{ChannelLayout, OutputDevice, OutputPort};
use crate::audio::queue::Readiness;
use crate::audio::sample::Sample;
use crate::constants::{OUTPUT_SAMPLE_RATE, SAMPLE_WIDTH_BITS};
use crate::error::AudioError;

/// Options applied when opening a channel
#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    /// Fail instead of continuing when the stereo layout cannot be set
    pub strict_channels: bool,
}

/// Open audio write endpoint holding the sample it plays
pub struct OutputChannel<P: OutputPort> {
    port: P,
    sample: Sample,
    capacity: usize,
    fill_point: usize,
}

impl<P: OutputPort> OutputChannel<P> {
    /// Open a channel with default options
    pub fn open<D>(device: &mut D, sample: Sample) -> Result<Self, AudioError>
    where
        D: OutputDevice<Port = P>,
    {
        Self::open_with(device, sample, &ChannelOptions::default())
    }

    /// Configure the device and open a port able to take `sample` in one write
    pub fn open_with<D>(
        device: &mut D,
        sample: Sample,
        options: &ChannelOptions,
    ) -> Result<Self, AudioError>
    where
        D: OutputDevice<Port = P>,
    {
        match device.channel_mode() {
            Ok(mode) => info!(device = %device.name(), "Channel mode: {}", mode),
            Err(e) => warn!(device = %device.name(), "Failed to query channel mode: {}", e),
        }

        device.set_output_rate(OUTPUT_SAMPLE_RATE)?;

        let mut config = device.new_config();
        config.width = SAMPLE_WIDTH_BITS;
        if let Err(e) = device.set_channels(&mut config, ChannelLayout::Stereo) {
            if options.strict_channels {
                return Err(e);
            }
            // Playback continues with the device's layout
            warn!("Failed to set channels: {}", e);
        }

        let samples = sample.sample_count();
        config.queue_size = samples;

        let mut port = device.open_port(&config)?;
        let fill_point = samples - 1;
        port.set_fill_point(fill_point)?;

        info!(
            capacity = samples,
            fill_point,
            channels = config.channels,
            "Output channel ready"
        );

        Ok(Self {
            port,
            sample,
            capacity: samples,
            fill_point,
        })
    }

    /// Current queue depth; 0 means idle
    pub fn filled(&self) -> usize {
        self.port.filled()
    }

    pub fn is_idle(&self) -> bool {
        self.filled() == 0
    }

    /// Pollable write-readiness handle
    pub fn readiness(&self) -> Readiness {
        self.port.readiness()
    }

    /// Queue capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fill_point(&self) -> usize {
        self.fill_point
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Hand the whole sample to the device queue
    pub(crate) fn write_sample(&mut self) -> Result<(), AudioError> {
        self.port.write(self.sample.samples())
    }

    /// Hand the whole sample to the device queue, waiting for room
    pub(crate) fn write_sample_blocking(&mut self) -> Result<(), AudioError> {
        self.port.write_blocking(self.sample.samples())
    }
}
