//! Ping Chime
//!
//! Plays a sound whenever an ICMP echo request is received.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ping_chime::{
    audio::{
        device::{list_output_devices, OutputDevice, OutputPort},
        sample, CpalOutput, MemoryDevice, OutputChannel, Sample,
    },
    capture::{self, OfflineCapture},
    config::{AppConfig, OutputBackend},
    playback::{PlaybackOutcome, PlaybackTrigger},
};

fn main() -> Result<()> {
    let (config, files) = AppConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ping Chime");
    for file in &files {
        tracing::info!("Loaded config from {}", file.display());
    }

    let sample = sample::load(&config.sound.path)
        .with_context(|| format!("Failed to load {}", config.sound.path.display()))?;

    match config.output.backend {
        OutputBackend::Cpal => {
            for name in list_output_devices() {
                tracing::debug!("Output device: {}", name);
            }
            let device = CpalOutput::open(config.output.device.as_deref())
                .context("Failed to open audio output device")?;
            run(device, sample, &config)
        }
        OutputBackend::Null => run(MemoryDevice::realtime(), sample, &config),
    }
}

fn run<D: OutputDevice>(mut device: D, sample: Sample, config: &AppConfig) -> Result<()> {
    let channel = OutputChannel::open_with(&mut device, sample, &config.output.channel_options())
        .context("Failed to open audio output port")?;
    let mut trigger = PlaybackTrigger::new(channel);

    if config.output.startup_chime {
        let outcome = trigger.play(true).context("Startup chime failed")?;
        debug_assert_eq!(outcome, PlaybackOutcome::Completed);
        tracing::info!("Startup chime played");
    }

    let settings = config.capture.settings();
    let limit = config.capture.limit();

    let summary = match &config.capture.replay {
        Some(path) => {
            let mut source = OfflineCapture::open(path, &settings)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            capture::run(&mut source, &mut trigger, limit)?
        }
        None => capture::run_live(config.capture.interface.as_deref(), &settings, &mut trigger, limit)
            .context("Capture failed")?,
    };

    let stats = trigger.stats();
    tracing::info!(
        "Done: {} pings, {} played, {} skipped",
        summary.matched,
        stats.written,
        stats.skipped
    );

    drain(trigger);
    Ok(())
}

/// Let the last chime finish before the port is closed
fn drain<P: OutputPort>(trigger: PlaybackTrigger<P>) {
    let channel = trigger.into_channel();
    if !channel.is_idle() {
        channel.readiness().wait();
    }
}
