//! TOML-based configuration persistence for the broadcast server.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\AudioSync\config.toml`
//! - Linux:    `~/.config/audiosync/config.toml`
//! - macOS:    `~/Library/Application Support/AudioSync/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [server]
//! log_level = "info"
//! start_in_test_mode = false
//!
//! [network]
//! port = 12345
//! bind_address = "0.0.0.0"
//! reuse_address = true
//!
//! [audio]
//! buffer_frames = 1024
//! sample_rate = 44100
//! tone_frequency_hz = 440.0
//! tone_duration_ms = 200
//!
//! [service]
//! name = "AudioSyncService"
//! service_type = "_audiosync._tcp"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]` and every section is
//! `#[serde(default)]`, so a missing file, a missing section and a missing
//! field all fall back to the values shown above.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use audiosync_core::ToneSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::advertisement::{SERVICE_NAME, SERVICE_TYPE};
use crate::server::{ServerConfig, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// General behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Start streaming the test tone instead of live capture.
    #[serde(default)]
    pub start_in_test_mode: bool,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP service port.  `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Set `SO_REUSEADDR` on the listening socket.
    #[serde(default = "default_true")]
    pub reuse_address: bool,
}

/// Capture and test-tone settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Live capture buffer size in frames.
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: u32,
    /// Test-tone sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_tone_frequency")]
    pub tone_frequency_hz: f64,
    /// Length of one test tone (and the interval between tones).
    #[serde(default = "default_tone_duration_ms")]
    pub tone_duration_ms: u64,
}

/// Service advertisement identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_type")]
    pub service_type: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_buffer_frames() -> u32 {
    1024
}
fn default_sample_rate() -> u32 {
    44_100
}
fn default_tone_frequency() -> f64 {
    440.0
}
fn default_tone_duration_ms() -> u64 {
    200
}
fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}
fn default_service_type() -> String {
    SERVICE_TYPE.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            start_in_test_mode: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            reuse_address: default_true(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_frames: default_buffer_frames(),
            sample_rate: default_sample_rate(),
            tone_frequency_hz: default_tone_frequency(),
            tone_duration_ms: default_tone_duration_ms(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            service_type: default_service_type(),
        }
    }
}

impl AppConfig {
    /// Converts the file representation into runtime server settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable bind address or a
    /// zero-length buffer, sample rate or tone.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let bind_address: IpAddr =
            self.network
                .bind_address
                .parse()
                .map_err(|e| ConfigError::Invalid {
                    field: "network.bind_address",
                    reason: format!("{e}"),
                })?;
        if self.audio.buffer_frames == 0 {
            return Err(invalid("audio.buffer_frames", "must be greater than zero"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than zero"));
        }
        if self.audio.tone_duration_ms == 0 {
            return Err(invalid("audio.tone_duration_ms", "must be greater than zero"));
        }

        Ok(ServerConfig {
            bind_address,
            port: self.network.port,
            reuse_address: self.network.reuse_address,
            buffer_frames: self.audio.buffer_frames,
            tone: ToneSpec {
                frequency_hz: self.audio.tone_frequency_hz,
                sample_rate: self.audio.sample_rate,
                duration: Duration::from_millis(self.audio.tone_duration_ms),
            },
            start_in_test_mode: self.server.start_in_test_mode,
            service_name: self.service.name.clone(),
            service_type: self.service.service_type.clone(),
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning defaults if the
/// file does not yet exist.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
pub fn save_config(config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let path = config_file_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AudioSync"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("audiosync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AudioSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("audiosync_test_{}", Uuid::new_v4()))
    }

    // ── AppConfig defaults ────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_has_service_port_12345() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.network.port, 12345);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert!(cfg.network.reuse_address);
    }

    #[test]
    fn test_app_config_default_audio_matches_test_tone() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.audio.buffer_frames, 1024);
        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.audio.tone_frequency_hz, 440.0);
        assert_eq!(cfg.audio.tone_duration_ms, 200);
    }

    #[test]
    fn test_general_config_default_log_level_is_info() {
        let cfg = GeneralConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.start_in_test_mode);
    }

    #[test]
    fn test_service_config_default_identity() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.name, "AudioSyncService");
        assert_eq!(cfg.service_type, "_audiosync._tcp");
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.network.port = 9000;
        cfg.audio.tone_frequency_hz = 880.0;
        cfg.server.start_in_test_mode = true;

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_network_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[network]
port = 23456
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.network.port, 23456);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.audio.buffer_frames, 1024);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    // ── Conversion to ServerConfig ────────────────────────────────────────────

    #[test]
    fn test_to_server_config_maps_every_section() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.network.bind_address = "127.0.0.1".to_string();
        cfg.network.port = 4000;
        cfg.audio.tone_duration_ms = 100;
        cfg.service.name = "Studio".to_string();

        // Act
        let server = cfg.to_server_config().expect("valid config");

        // Assert
        assert_eq!(server.socket_addr(), "127.0.0.1:4000".parse().unwrap());
        assert_eq!(server.tone.duration, Duration::from_millis(100));
        assert_eq!(server.tone.sample_count(), 4410);
        assert_eq!(server.service_name, "Studio");
    }

    #[test]
    fn test_to_server_config_rejects_bad_bind_address() {
        let mut cfg = AppConfig::default();
        cfg.network.bind_address = "not-an-ip".to_string();

        let result = cfg.to_server_config();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "network.bind_address",
                ..
            })
        ));
    }

    #[test]
    fn test_to_server_config_rejects_zero_buffer() {
        let mut cfg = AppConfig::default();
        cfg.audio.buffer_frames = 0;
        assert!(cfg.to_server_config().is_err());
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = temp_dir().join("config.toml");

        let cfg = load_config_from(&path).expect("missing file is not an error");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.network.port = 31337;
        cfg.server.log_level = "debug".to_string();

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_malformed_file_is_parse_error() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[network\nport = ").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI environment is also acceptable.
    }
}
