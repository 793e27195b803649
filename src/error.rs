//! Error types for the ping chime

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sample file errors, raised only while loading
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to open sample {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Expecting a 44100 Hz sample, found {found} Hz")]
    UnsupportedRate { found: u32 },

    #[error("Unsupported sample encoding: {0}")]
    UnsupportedFormat(String),

    #[error("Sample data truncated: expected {expected} samples, read {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Sample contains no frames")]
    Empty,
}

/// Audio device and port errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device configuration failed: {0}")]
    Config(String),

    #[error("Failed to open audio output port: {0}")]
    PortOpen(String),

    #[error("Failed to set channels: {0}")]
    ChannelLayout(String),

    #[error("Write of {requested} samples exceeds free queue space ({free})")]
    QueueOverflow { requested: usize, free: usize },

    #[error("Invalid fill point {fill_point} for queue of {capacity}")]
    FillPoint { fill_point: usize, capacity: usize },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Packet capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Couldn't find capture device: {0}")]
    InterfaceNotFound(String),

    #[error("Couldn't get netmask for device {device}: {reason}")]
    Lookup { device: String, reason: String },

    #[error("Couldn't open device {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("Couldn't parse filter {filter}: {reason}")]
    FilterCompile { filter: String, reason: String },

    #[error("Couldn't install filter {filter}: {reason}")]
    FilterInstall { filter: String, reason: String },

    #[error("Capture read failed: {0}")]
    Read(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
