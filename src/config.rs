//! Configuration
//!
//! Every field has a default, so the program runs with no file at all.
//! Files are discovered in the standard locations and merged in order,
//! then a handful of environment variables override the result.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::audio::channel::ChannelOptions;
use crate::capture::dispatch::PacketLimit;
use crate::capture::source::CaptureSettings;
use crate::constants::{
    DEFAULT_MAX_PACKETS, DEFAULT_SOUND_PATH, ECHO_REQUEST_FILTER, READ_TIMEOUT_MS, SNAPSHOT_LEN,
};
use crate::error::Error;

const APP_NAME: &str = "ping-chime";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sound: SoundConfig,
    pub output: OutputConfig,
    pub capture: CaptureConfig,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sound: SoundConfig::default(),
            output: OutputConfig::default(),
            capture: CaptureConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// WAV file played on every ping
    pub path: PathBuf,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOUND_PATH),
        }
    }
}

/// Where audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// System audio through cpal
    Cpal,
    /// Discarded in real time, nothing audible
    Null,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub backend: OutputBackend,
    /// Output device name; host default when unset
    pub device: Option<String>,
    /// Play the sample once, synchronously, before capture starts
    pub startup_chime: bool,
    /// Treat a failure to select the stereo layout as fatal
    pub strict_channels: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: OutputBackend::Cpal,
            device: None,
            startup_chime: false,
            strict_channels: false,
        }
    }
}

impl OutputConfig {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            strict_channels: self.strict_channels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface to capture on; library default when unset
    pub interface: Option<String>,
    /// Replay this savefile instead of capturing live
    pub replay: Option<PathBuf>,
    pub snaplen: i32,
    pub promiscuous: bool,
    pub timeout_ms: i32,
    pub filter: String,
    /// Matching packets to handle before exiting, `0` for no limit
    pub max_packets: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            replay: None,
            snaplen: SNAPSHOT_LEN,
            promiscuous: true,
            timeout_ms: READ_TIMEOUT_MS,
            filter: ECHO_REQUEST_FILTER.to_string(),
            max_packets: DEFAULT_MAX_PACKETS,
        }
    }
}

impl CaptureConfig {
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            snaplen: self.snaplen,
            promiscuous: self.promiscuous,
            timeout_ms: self.timeout_ms,
            filter: self.filter.clone(),
        }
    }

    pub fn limit(&self) -> PacketLimit {
        PacketLimit::from_count(self.max_packets)
    }
}

impl AppConfig {
    /// Load from the standard locations and apply environment overrides.
    ///
    /// Returns the config and the files it was read from.
    pub fn load() -> Result<(Self, Vec<PathBuf>), Error> {
        let files = discover_config_files();
        let mut config = Self::from_files(&files)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok((config, files))
    }

    /// Merge `files` in order, later keys winning
    pub fn from_files(files: &[PathBuf]) -> Result<Self, Error> {
        let mut merged = toml::Table::new();
        for path in files {
            merge_tables(&mut merged, read_table(path)?);
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        Self::from_files(&[path.to_path_buf()])
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Overlay `PING_CHIME_*` variables obtained through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PING_CHIME_SOUND") {
            self.sound.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PING_CHIME_INTERFACE") {
            self.capture.interface = Some(v);
        }
        if let Some(v) = lookup("PING_CHIME_REPLAY") {
            self.capture.replay = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PING_CHIME_MAX_PACKETS") {
            self.capture.max_packets = v.trim().parse().map_err(|_| {
                Error::Config(format!("PING_CHIME_MAX_PACKETS: not a count: {}", v))
            })?;
        }
        if let Some(v) = lookup("PING_CHIME_OUTPUT") {
            self.output.backend = match v.trim().to_ascii_lowercase().as_str() {
                "cpal" => OutputBackend::Cpal,
                "null" => OutputBackend::Null,
                other => {
                    return Err(Error::Config(format!(
                        "PING_CHIME_OUTPUT: unknown backend {}",
                        other
                    )))
                }
            };
        }
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<toml::Table, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Loading config");
    contents
        .parse()
        .map_err(|e: toml::de::Error| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Recursively overlay `overlay` onto `base`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Config files that exist, lowest precedence first
pub fn discover_config_files() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("/etc").join(APP_NAME).join("config.toml")];

    if let Some(dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        candidates.push(dirs.config_dir().join("config.toml"));
    }
    candidates.push(PathBuf::from(format!("{}.toml", APP_NAME)));

    candidates.into_iter().filter(|p| p.exists()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.capture.limit(), PacketLimit::Bounded(1023));
        assert_eq!(config.capture.settings(), CaptureSettings::default());
        assert_eq!(config.output.backend, OutputBackend::Cpal);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml_str(
            r#"
            log_level = "debug"

            [sound]
            path = "/opt/sounds/ting.wav"

            [output]
            backend = "null"
            strict_channels = true

            [capture]
            interface = "eth0"
            max_packets = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sound.path, PathBuf::from("/opt/sounds/ting.wav"));
        assert_eq!(config.output.backend, OutputBackend::Null);
        assert!(config.output.channel_options().strict_channels);
        assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
        assert_eq!(config.capture.limit(), PacketLimit::Unbounded);
        assert_eq!(config.capture.snaplen, 128);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(AppConfig::from_toml_str("[output]\nbackend = \"alsa\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("PING_CHIME_SOUND", "/tmp/ding.wav"),
                ("PING_CHIME_INTERFACE", "wlan0"),
                ("PING_CHIME_MAX_PACKETS", "3"),
                ("PING_CHIME_OUTPUT", "NULL"),
                ("PING_CHIME_REPLAY", "/tmp/pings.pcap"),
            ]))
            .unwrap();

        assert_eq!(config.sound.path, PathBuf::from("/tmp/ding.wav"));
        assert_eq!(config.capture.interface.as_deref(), Some("wlan0"));
        assert_eq!(config.capture.limit(), PacketLimit::Bounded(3));
        assert_eq!(config.output.backend, OutputBackend::Null);
        assert_eq!(config.capture.replay, Some(PathBuf::from("/tmp/pings.pcap")));
    }

    #[test]
    fn test_bad_env_count() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("PING_CHIME_MAX_PACKETS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping-chime.toml");
        std::fs::write(&path, "[capture]\ntimeout_ms = 250\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.capture.timeout_ms, 250);
        assert!(AppConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.toml");
        let local = dir.path().join("local.toml");
        std::fs::write(&system, "[capture]\ninterface = \"eth0\"\nmax_packets = 10\n").unwrap();
        std::fs::write(&local, "[capture]\nmax_packets = 20\n").unwrap();

        let config = AppConfig::from_files(&[system, local]).unwrap();
        assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
        assert_eq!(config.capture.max_packets, 20);
    }
}
