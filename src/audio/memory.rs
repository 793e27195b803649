//! In-process output device
//!
//! Behaves like hardware from the producer's point of view, but nothing
//! reaches a speaker. Ports either drain only when told to (tests) or
//! are drained by a background thread at the configured output rate
//! (the `null` backend, useful on headless capture hosts).

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::device::{ChannelLayout, OutputDevice, OutputPort, PortConfig};
use crate::audio::queue::{Readiness, SampleQueue};
use crate::constants::OUTPUT_CHANNELS;
use crate::error::AudioError;

/// Drain tick for realtime ports
const DRAIN_TICK: Duration = Duration::from_millis(10);

/// In-process output device
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    channel_mode: u16,
    output_rate: Option<u32>,
    supported_channels: Vec<u16>,
    fail_open: bool,
    realtime: bool,
    ports_opened: usize,
}

impl MemoryDevice {
    /// Device whose ports drain only through [`MemoryPort::drain`]
    pub fn new() -> Self {
        Self {
            channel_mode: OUTPUT_CHANNELS,
            output_rate: None,
            supported_channels: vec![1, 2, 4],
            fail_open: false,
            realtime: false,
            ports_opened: 0,
        }
    }

    /// Device whose ports drain in the background at the output rate
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::new()
        }
    }

    /// Restrict the channel counts a port may be configured with
    pub fn with_supported_channels(mut self, channels: &[u16]) -> Self {
        self.supported_channels = channels.to_vec();
        self
    }

    /// Make every port open fail
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Output rate last set on the device
    pub fn output_rate(&self) -> Option<u32> {
        self.output_rate
    }

    pub fn ports_opened(&self) -> usize {
        self.ports_opened
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for MemoryDevice {
    type Port = MemoryPort;

    fn name(&self) -> String {
        "memory".to_string()
    }

    fn channel_mode(&self) -> Result<u16, AudioError> {
        Ok(self.channel_mode)
    }

    fn set_output_rate(&mut self, rate: u32) -> Result<(), AudioError> {
        self.output_rate = Some(rate);
        Ok(())
    }

    fn new_config(&self) -> PortConfig {
        PortConfig {
            channels: self.channel_mode,
            ..PortConfig::default()
        }
    }

    fn set_channels(
        &self,
        config: &mut PortConfig,
        layout: ChannelLayout,
    ) -> Result<(), AudioError> {
        let channels = layout.channels();
        if !self.supported_channels.contains(&channels) {
            return Err(AudioError::ChannelLayout(format!(
                "memory device does not support {} channels",
                channels
            )));
        }
        config.channels = channels;
        Ok(())
    }

    fn open_port(&mut self, config: &PortConfig) -> Result<MemoryPort, AudioError> {
        if self.fail_open {
            return Err(AudioError::PortOpen("memory device refused port".to_string()));
        }

        let queue = Arc::new(SampleQueue::new(config.queue_size));
        self.ports_opened += 1;

        if self.realtime {
            let rate = self.output_rate.unwrap_or(crate::constants::OUTPUT_SAMPLE_RATE);
            let per_tick = rate as usize * OUTPUT_CHANNELS as usize
                * DRAIN_TICK.as_millis() as usize
                / 1000;
            spawn_drain(Arc::downgrade(&queue), per_tick);
            info!(rate, "Opened realtime memory port");
        }

        Ok(MemoryPort {
            queue,
            config: config.clone(),
            writes: 0,
        })
    }
}

/// Discard `per_tick` samples every tick until the port is dropped
fn spawn_drain(queue: Weak<SampleQueue>, per_tick: usize) {
    let spawned = thread::Builder::new()
        .name("memory-drain".to_string())
        .spawn(move || {
            while let Some(queue) = queue.upgrade() {
                queue.discard(per_tick);
                drop(queue);
                thread::sleep(DRAIN_TICK);
            }
            debug!("Memory port closed, drain thread exiting");
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to spawn drain thread: {}", e);
    }
}

/// Port of a [`MemoryDevice`]
pub struct MemoryPort {
    queue: Arc<SampleQueue>,
    config: PortConfig,
    writes: usize,
}

impl MemoryPort {
    /// Consume up to `n` samples as the hardware would
    pub fn drain(&self, n: usize) -> usize {
        self.queue.discard(n)
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn fill_point(&self) -> usize {
        self.queue.fill_point()
    }

    /// Shared handle to the queue, for draining from another thread
    pub fn queue(&self) -> Arc<SampleQueue> {
        self.queue.clone()
    }
}

impl OutputPort for MemoryPort {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.queue.push_all(samples)?;
        self.writes += 1;
        Ok(())
    }

    fn write_blocking(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.queue.push_all_blocking(samples)?;
        self.writes += 1;
        Ok(())
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
