//! Capture dispatcher
//!
//! Pulls packets from a source, keeps only echo requests and fires the
//! trigger once per match. Everything runs on the caller's thread; the
//! only blocking step is the source read, which is bounded by the
//! capture timeout.

use std::fmt;

use tracing::{debug, info};

use crate::capture::classify::{classify, LinkType, PacketClass};
use crate::capture::source::{CaptureSettings, LiveCapture, PacketSource, Poll};
use crate::error::Result;
use crate::playback::{PlaybackOutcome, Trigger};

/// How many matching packets to handle before returning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLimit {
    Bounded(u64),
    Unbounded,
}

impl PacketLimit {
    /// `0` means unbounded
    pub fn from_count(count: u64) -> Self {
        if count == 0 {
            PacketLimit::Unbounded
        } else {
            PacketLimit::Bounded(count)
        }
    }

    fn reached(self, matched: u64) -> bool {
        match self {
            PacketLimit::Bounded(max) => matched >= max,
            PacketLimit::Unbounded => false,
        }
    }
}

impl fmt::Display for PacketLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketLimit::Bounded(max) => write!(f, "{}", max),
            PacketLimit::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Counters from one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Packets delivered by the source
    pub seen: u64,
    /// Echo requests among them
    pub matched: u64,
    pub written: u64,
    pub skipped: u64,
    /// Reads that expired without a packet
    pub timeouts: u64,
}

/// Run the dispatch loop until `limit` matches or the source runs dry
pub fn run<S, T>(source: &mut S, trigger: &mut T, limit: PacketLimit) -> Result<DispatchSummary>
where
    S: PacketSource + ?Sized,
    T: Trigger + ?Sized,
{
    let link = source.link_type();
    let mut summary = DispatchSummary::default();

    info!(limit = %limit, link = ?link, "Waiting for pings");

    while !limit.reached(summary.matched) {
        let data = match source.next_packet()? {
            Poll::Packet(data) => data,
            Poll::Timeout => {
                summary.timeouts += 1;
                continue;
            }
            Poll::Exhausted => {
                debug!("Packet source exhausted");
                break;
            }
        };

        summary.seen += 1;
        let class = match link {
            // Framing unknown; the kernel filter has already matched it
            LinkType::Unsupported(_) => PacketClass::EchoRequest,
            _ => classify(link, data),
        };
        if !class.is_echo_request() {
            debug!(class = ?class, len = data.len(), "Ignoring packet");
            continue;
        }

        summary.matched += 1;
        debug!(len = data.len(), "Ping!");

        match trigger.fire()? {
            PlaybackOutcome::Skipped => summary.skipped += 1,
            PlaybackOutcome::Written | PlaybackOutcome::Completed => summary.written += 1,
        }
    }

    info!(
        seen = summary.seen,
        matched = summary.matched,
        written = summary.written,
        skipped = summary.skipped,
        "Capture finished"
    );

    Ok(summary)
}

/// Open a live capture on `interface` and run the dispatch loop on it
pub fn run_live<T>(
    interface: Option<&str>,
    settings: &CaptureSettings,
    trigger: &mut T,
    limit: PacketLimit,
) -> Result<DispatchSummary>
where
    T: Trigger + ?Sized,
{
    let mut capture = LiveCapture::open(interface, settings)?;
    run(&mut capture, trigger, limit)
}
