//! Application configuration loaded from a TOML file with per-field defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "usdstand.toml";

/// Supported document frame rates.
///
/// Independent of the host's tick rate; a higher value gives a smoother
/// animation at the cost of file size. Values above the host's own tick
/// rate produce degenerate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameRate {
    Fps6,
    Fps12,
    Fps15,
    Fps24,
    Fps30,
    Fps48,
    Fps60,
    Fps72,
    Fps75,
    Fps90,
}

impl FrameRate {
    pub fn as_u32(self) -> u32 {
        match self {
            FrameRate::Fps6 => 6,
            FrameRate::Fps12 => 12,
            FrameRate::Fps15 => 15,
            FrameRate::Fps24 => 24,
            FrameRate::Fps30 => 30,
            FrameRate::Fps48 => 48,
            FrameRate::Fps60 => 60,
            FrameRate::Fps72 => 72,
            FrameRate::Fps75 => 75,
            FrameRate::Fps90 => 90,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_u32())
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(FrameRate::Fps6),
            12 => Ok(FrameRate::Fps12),
            15 => Ok(FrameRate::Fps15),
            24 => Ok(FrameRate::Fps24),
            30 => Ok(FrameRate::Fps30),
            48 => Ok(FrameRate::Fps48),
            60 => Ok(FrameRate::Fps60),
            72 => Ok(FrameRate::Fps72),
            75 => Ok(FrameRate::Fps75),
            90 => Ok(FrameRate::Fps90),
            other => Err(format!("unsupported frame rate: {other}")),
        }
    }
}

impl From<FrameRate> for u32 {
    fn from(value: FrameRate) -> Self {
        value.as_u32()
    }
}

/// Settings for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSettings {
    /// Directory receiving archives and thumbnails.
    pub export_dir: PathBuf,
    /// Explicit output base name; falls back to the first child of the
    /// export root when unset.
    pub file_name: Option<String>,
    pub frame_rate: FrameRate,
    /// Recording length in seconds; the recorder stops itself once the
    /// sampled time reaches this bound.
    pub record_secs: f64,
    /// Twist the export root 180 degrees around the up axis so the model
    /// faces the AR viewer.
    pub flip_axis: bool,
    /// Write the intermediate scene document as text and keep it after
    /// packaging, instead of a binary document that is cleaned up.
    pub text_documents: bool,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("usdz"),
            file_name: None,
            frame_rate: FrameRate::Fps24,
            record_secs: 5.0,
            flip_axis: true,
            text_documents: false,
        }
    }
}

/// Settings for the catalog server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Directory scanned for archives; the process working directory when
    /// unset.
    pub directory: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            directory: Some(PathBuf::from("usdz")),
            host: "0.0.0.0".to_string(),
            port: 19900,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub record: RecordSettings,
    pub server: ServerSettings,
}

impl Config {
    /// Load configuration from the given path, or from `usdstand.toml` in
    /// the working directory. A missing default file yields the built-in
    /// defaults; an explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recording_stand() {
        let config = Config::default();
        assert_eq!(config.record.frame_rate, FrameRate::Fps24);
        assert_eq!(config.record.record_secs, 5.0);
        assert!(config.record.flip_axis);
        assert!(!config.record.text_documents);
        assert_eq!(config.server.port, 19900);
    }

    #[test]
    fn frame_rate_parses_from_integer() {
        let settings: RecordSettings = toml::from_str("frame_rate = 60").unwrap();
        assert_eq!(settings.frame_rate, FrameRate::Fps60);
        assert_eq!(settings.frame_rate.as_f64(), 60.0);
    }

    #[test]
    fn unsupported_frame_rate_is_rejected() {
        let result: Result<RecordSettings, _> = toml::from_str("frame_rate = 23");
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_overlays_defaults() {
        let config: Config = toml::from_str(
            r#"
            [record]
            record_secs = 2.5

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.record.record_secs, 2.5);
        assert_eq!(config.record.frame_rate, FrameRate::Fps24);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_default_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());
        // No explicit path: defaults even though usdstand.toml is absent.
        let config = Config::load(None).unwrap();
        assert_eq!(config.server.port, 19900);
    }
}
