//! Playback trigger
//!
//! Decides per request whether the sample is written. A request that
//! arrives while the previous playback is still queued is skipped, so
//! at most one playback is ever in flight.

use tracing::{debug, warn};

use crate::audio::channel::OutputChannel;
use crate::audio::device::OutputPort;
use crate::error::AudioError;

/// Result of one trigger request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Sample handed to the device queue
    Written,
    /// Previous playback still in progress, nothing written
    Skipped,
    /// Sample written and drained to the fill point
    Completed,
}

/// Request playback of the channel's sample.
///
/// With `wait == false` the call never blocks: a busy channel yields
/// [`PlaybackOutcome::Skipped`]. With `wait == true` the sample is always
/// written and the call blocks until the readiness handle signals.
pub fn trigger<P: OutputPort>(
    channel: &mut OutputChannel<P>,
    wait: bool,
) -> Result<PlaybackOutcome, AudioError> {
    if !wait {
        let filled = channel.filled();
        if filled > 0 {
            warn!(filled, "Sound already in progress");
            return Ok(PlaybackOutcome::Skipped);
        }
    }

    let readiness = channel.readiness();

    debug!("Writing {}", channel.sample().sample_count());

    if wait {
        channel.write_sample_blocking()?;
        readiness.wait();
        return Ok(PlaybackOutcome::Completed);
    }

    channel.write_sample()?;
    Ok(PlaybackOutcome::Written)
}

/// Something that reacts to a matched packet
pub trait Trigger {
    fn fire(&mut self) -> Result<PlaybackOutcome, AudioError>;
}

/// Trigger counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub written: u64,
    pub skipped: u64,
    pub completed: u64,
}

/// Owns the output channel and counts outcomes
pub struct PlaybackTrigger<P: OutputPort> {
    channel: OutputChannel<P>,
    stats: TriggerStats,
}

impl<P: OutputPort> PlaybackTrigger<P> {
    pub fn new(channel: OutputChannel<P>) -> Self {
        Self {
            channel,
            stats: TriggerStats::default(),
        }
    }

    /// Request playback, counting the outcome
    pub fn play(&mut self, wait: bool) -> Result<PlaybackOutcome, AudioError> {
        let outcome = trigger(&mut self.channel, wait)?;
        match outcome {
            PlaybackOutcome::Written => self.stats.written += 1,
            PlaybackOutcome::Skipped => self.stats.skipped += 1,
            PlaybackOutcome::Completed => self.stats.completed += 1,
        }
        Ok(outcome)
    }

    pub fn stats(&self) -> &TriggerStats {
        &self.stats
    }

    pub fn channel(&self) -> &OutputChannel<P> {
        &self.channel
    }

    pub fn into_channel(self) -> OutputChannel<P> {
        self.channel
    }
}

impl<P: OutputPort> Trigger for PlaybackTrigger<P> {
    /// Capture path: never waits
    fn fire(&mut self) -> Result<PlaybackOutcome, AudioError> {
        self.play(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory::{MemoryDevice, MemoryPort};
    use crate::audio::sample::Sample;
    use std::thread;
    use std::time::Duration;

    fn channel(frames: usize) -> OutputChannel<MemoryPort> {
        let sample = Sample::from_interleaved(vec![7; frames * 2], 44100).unwrap();
        OutputChannel::open(&mut MemoryDevice::new(), sample).unwrap()
    }

    #[test]
    fn test_idle_write_then_skip() {
        let mut channel = channel(4410);
        assert_eq!(channel.filled(), 0);

        assert_eq!(trigger(&mut channel, false).unwrap(), PlaybackOutcome::Written);
        assert_eq!(channel.filled(), 8820);

        assert_eq!(trigger(&mut channel, false).unwrap(), PlaybackOutcome::Skipped);
        assert_eq!(channel.filled(), 8820);
        assert_eq!(channel.port().writes(), 1);
    }

    #[test]
    fn test_skip_while_partially_drained() {
        let mut channel = channel(100);
        trigger(&mut channel, false).unwrap();
        channel.port().drain(199);
        assert_eq!(channel.filled(), 1);

        assert_eq!(trigger(&mut channel, false).unwrap(), PlaybackOutcome::Skipped);
        assert_eq!(channel.filled(), 1);
    }

    #[test]
    fn test_write_again_after_drain() {
        let mut channel = channel(100);
        trigger(&mut channel, false).unwrap();
        channel.port().drain(200);

        assert_eq!(trigger(&mut channel, false).unwrap(), PlaybackOutcome::Written);
        assert_eq!(channel.port().writes(), 2);
    }

    #[test]
    fn test_wait_blocks_until_drained() {
        let mut channel = channel(1000);
        let queue = channel.port().queue();

        let drainer = thread::spawn(move || {
            while queue.filled() == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            for _ in 0..20 {
                thread::sleep(Duration::from_millis(1));
                queue.discard(100);
            }
        });

        assert_eq!(trigger(&mut channel, true).unwrap(), PlaybackOutcome::Completed);
        assert!(channel.filled() <= 1);
        drainer.join().unwrap();
    }

    #[test]
    fn test_wait_writes_even_when_busy() {
        let mut channel = channel(100);
        trigger(&mut channel, false).unwrap();
        let queue = channel.port().queue();

        let drainer = thread::spawn(move || {
            for _ in 0..40 {
                thread::sleep(Duration::from_millis(1));
                queue.discard(20);
            }
        });

        assert_eq!(trigger(&mut channel, true).unwrap(), PlaybackOutcome::Completed);
        assert_eq!(channel.port().writes(), 2);
        drainer.join().unwrap();
    }

    #[test]
    fn test_trigger_counts_outcomes() {
        let mut trigger = PlaybackTrigger::new(channel(100));
        assert_eq!(trigger.fire().unwrap(), PlaybackOutcome::Written);
        assert_eq!(trigger.fire().unwrap(), PlaybackOutcome::Skipped);
        assert_eq!(trigger.fire().unwrap(), PlaybackOutcome::Skipped);

        assert_eq!(
            trigger.stats(),
            &TriggerStats {
                written: 1,
                skipped: 2,
                completed: 0
            }
        );
    }
}
