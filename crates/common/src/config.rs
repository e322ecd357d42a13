//! Application configuration.
//!
//! Only startup defaults live here. Live session state (current effect,
//! intensity, camera) is held in memory by the running session and is
//! never written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where stills and clips are exported.
    pub output_dir: PathBuf,

    /// Camera acquisition defaults.
    pub capture: CaptureDefaults,

    /// Effect selected at startup.
    pub effect: EffectDefaults,

    /// Default recording parameters.
    pub recording: RecordingDefaults,

    /// Live display parameters.
    pub display: DisplayConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Camera acquisition defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Preferred camera device id; `None` picks the system default.
    pub device: Option<String>,

    /// Ideal capture width. The camera may negotiate something else.
    pub ideal_width: u32,

    /// Ideal capture height.
    pub ideal_height: u32,

    /// Prefer a user-facing camera when the platform can tell.
    pub facing_user: bool,

    /// Whether to open a microphone alongside the camera.
    pub audio: bool,
}

/// Effect selected at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectDefaults {
    /// Effect id (`none`, `grayscale`, `sepia`, `vintage`, `invert`,
    /// `rgbSplit`, `scanlines`).
    pub effect: String,

    /// Blend intensity in `[0, 1]`. Out-of-range values are clamped on use.
    pub intensity: f32,

    /// Optional grain texture tiled by the `scanlines` overlay.
    pub grain_texture: Option<PathBuf>,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Rate at which the display surface is sampled into the encoder.
    pub fps: u32,

    /// Preferred video codec (`vp9` or `vp8`); falls back to the encoder
    /// default. Clips are always WebM.
    pub video_codec: String,
}

/// Live display parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Refresh rate driving the render loop (Hz).
    pub refresh_hz: u32,

    /// Whether to open a live preview window.
    pub window: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "digicam=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            capture: CaptureDefaults::default(),
            effect: EffectDefaults::default(),
            recording: RecordingDefaults::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            device: None,
            ideal_width: 1280,
            ideal_height: 720,
            facing_user: true,
            audio: true,
        }
    }
}

impl Default for EffectDefaults {
    fn default() -> Self {
        Self {
            effect: "none".to_string(),
            intensity: 0.5,
            grain_texture: None,
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_codec: "vp9".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60,
            window: true,
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
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `config_path`, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Write pretty JSON to `config_path`, creating parent directories.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("digicam").join("config.json")
}

/// Default export directory.
fn default_output_dir() -> PathBuf {
    let base = std::env::var("XDG_PICTURES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Pictures")
        });
    base.join("digicam")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_preferences() {
        let config = AppConfig::default();
        assert_eq!(config.capture.ideal_width, 1280);
        assert_eq!(config.capture.ideal_height, 720);
        assert!(config.capture.facing_user);
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.recording.video_codec, "vp9");
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = std::env::temp_dir().join(format!("digicam-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.json");
        let _ = std::fs::remove_dir_all(&dir);

        let mut config = AppConfig::default();
        config.effect.effect = "vintage".to_string();
        config.recording.fps = 24;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.effect.effect, "vintage");
        assert_eq!(loaded.recording.fps, 24);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("digicam-config-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.effect.effect, "none");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn partial_json_fills_missing_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"effect": {"effect": "sepia"}}"#).unwrap();
        assert_eq!(config.effect.effect, "sepia");
        assert!((config.effect.intensity - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.display.refresh_hz, 60);
    }
}
