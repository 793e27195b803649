//! # Ping Chime
//!
//! Plays a short sound through the local audio device whenever an ICMP
//! echo request ("ping") crosses the capture interface.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Network interface                                               │
//! │        │  snaplen 128, promiscuous, 1000 ms read timeout         │
//! │        ▼                                                         │
//! │  ┌───────────────────────────┐                                   │
//! │  │ Kernel filter             │  icmp[icmptype] = icmp-echo       │
//! │  └─────────────┬─────────────┘                                   │
//! │                ▼                                                 │
//! │  ┌───────────────────────────┐                                   │
//! │  │ Dispatcher (capture)      │  classify, count, stop at limit   │
//! │  └─────────────┬─────────────┘                                   │
//! │                ▼  one fire per echo request                      │
//! │  ┌───────────────────────────┐                                   │
//! │  │ Playback trigger          │  busy? skip : write whole sample  │
//! │  └─────────────┬─────────────┘                                   │
//! │                ▼                                                 │
//! │  ┌───────────────────────────┐     ┌──────────────────────────┐  │
//! │  │ Output channel (audio)    │────▶│ Device queue ──▶ speaker │  │
//! │  │ queue = one sample        │     │ drained on the hw clock  │  │
//! │  └───────────────────────────┘     └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Capture, classification and triggering share one thread. The only
//! blocking step on that path is the capture read.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// The only sample rate the device is driven at; samples are never resampled
    pub const OUTPUT_SAMPLE_RATE: u32 = 44100;

    /// Channel count of a loaded sample
    pub const OUTPUT_CHANNELS: u16 = 2;

    /// Port sample width in bits
    pub const SAMPLE_WIDTH_BITS: u16 = 16;

    /// Bytes captured per packet, enough for IP and ICMP headers
    pub const SNAPSHOT_LEN: i32 = 128;

    /// Upper bound on one blocking capture read
    pub const READ_TIMEOUT_MS: i32 = 1000;

    /// Capture filter for echo requests only
    pub const ECHO_REQUEST_FILTER: &str = "icmp[icmptype] = icmp-echo";

    /// Matching packets handled before exit
    pub const DEFAULT_MAX_PACKETS: u64 = 1023;

    pub const DEFAULT_SOUND_PATH: &str = "/usr/share/ping-chime/ting.wav";

    pub const IPPROTO_ICMP: u8 = 1;
    pub const ICMP_ECHO_REPLY: u8 = 0;
    pub const ICMP_ECHO_REQUEST: u8 = 8;
}
