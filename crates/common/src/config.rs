//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReelError, ReelResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where saved slideshows are written.
    pub exports_dir: PathBuf,

    /// Directory holding playable previews of the current artifact.
    pub preview_dir: PathBuf,

    /// Default export settings.
    pub export: ExportDefaults,

    /// Encoder settings.
    pub encoder: EncoderConfig,

    /// Image loading settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Seconds each photo stays on screen.
    pub seconds_per_photo: f64,

    /// Transition between photos (fade, slide, zoom, none).
    pub transition: String,

    /// Topic used in saved file names.
    pub topic: String,
}

/// Encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// ffmpeg binary to invoke.
    pub ffmpeg_path: String,

    /// Constant video bitrate in kbps.
    pub video_bitrate_kbps: u32,
}

/// Image loader parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Maximum number of images fetched and decoded at once.
    pub max_parallel_loads: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "slidereel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exports_dir: dirs_default_exports(),
            preview_dir: std::env::temp_dir().join("slidereel-previews"),
            export: ExportDefaults::default(),
            encoder: EncoderConfig::default(),
            loader: LoaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            seconds_per_photo: 3.0,
            transition: "fade".to_string(),
            topic: "project".to_string(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            video_bitrate_kbps: 8000,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_parallel_loads: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load from the standard location.
    ///
    /// A missing file yields defaults silently; an unreadable or malformed
    /// one yields defaults with a warning.
    pub fn load() -> Self {
        let path = config_file_path();
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring config file");
            Self::default()
        })
    }

    /// Parse the config at `path`.
    pub fn load_from(path: &Path) -> ReelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ReelError::config(format!("{}: {e}", path.display())))
    }

    /// Save to the standard location.
    pub fn save(&self) -> ReelResult<()> {
        self.save_to(&config_file_path())
    }

    /// Write pretty-printed JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ReelResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Path the config is loaded from and saved to.
    pub fn path() -> PathBuf {
        config_file_path()
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// `$XDG_CONFIG_HOME/slidereel/config.json`, or `~/.config/...`.
fn config_file_path() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("slidereel")
        .join("config.json")
}

/// `$XDG_VIDEOS_DIR/slidereel`, or `~/Videos/slidereel`.
fn dirs_default_exports() -> PathBuf {
    std::env::var_os("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join("Videos"))
        .join("slidereel")
}
