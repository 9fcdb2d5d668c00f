//! Configuration file management for vmemo.
//!
//! Configuration lives at `~/.config/vmemo/vmemo.toml`. A missing file is not
//! an error; every field falls back to its default.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Audio capture, metering and playback configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Audio input device. Options:
    /// - "default" for the system default device
    /// - numeric index (0, 1, 2, ...) from `vmemo list-devices`
    /// - device name from `vmemo list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Requested recording sample rate in Hz (actual may differ per device)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Period between live level emissions in milliseconds
    #[serde(default = "default_level_period_ms")]
    pub level_period_ms: u64,
    /// Maximum retained live level samples (oldest evicted first)
    #[serde(default = "default_live_series_cap")]
    pub live_series_cap: usize,
    /// Number of bars in the reduced playback waveform
    #[serde(default = "default_display_bars")]
    pub display_bars: usize,
    /// Minimum recording length in seconds before stop is allowed
    #[serde(default = "default_min_record_secs")]
    pub min_record_secs: u64,
    /// Period between playback progress updates in milliseconds
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_level_period_ms() -> u64 {
    50
}

fn default_live_series_cap() -> usize {
    1000
}

fn default_display_bars() -> usize {
    300
}

fn default_min_record_secs() -> u64 {
    15
}

fn default_progress_tick_ms() -> u64 {
    100
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            level_period_ms: default_level_period_ms(),
            live_series_cap: default_live_series_cap(),
            display_bars: default_display_bars(),
            min_record_secs: default_min_record_secs(),
            progress_tick_ms: default_progress_tick_ms(),
        }
    }
}

/// Recording storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory where encoded recordings are written.
    /// Defaults to `~/.local/share/vmemo/recordings`.
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
}

fn default_recordings_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("vmemo")
        .join("recordings")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmemoConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VmemoConfig {
    /// Loads configuration from the user's config directory, falling back to
    /// defaults when no file exists yet.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If an existing file cannot be read or contains malformed TOML
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;

        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: VmemoConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Retrieves the path to the config file, creating parent directories.
fn get_config_path() -> Result<PathBuf, std::io::Error> {
    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    let config_path = home.join(".config").join("vmemo").join("vmemo.toml");

    std::fs::create_dir_all(config_path.parent().unwrap())?;

    Ok(config_path)
}
