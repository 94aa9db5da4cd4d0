//! TOML configuration for the pixelcam binary.
//!
//! Everything here has a sensible default, so an empty file (or no file at
//! all) yields a working setup: 640x480 source, 128x112 output grid, 10 fps
//! operating rate, grayscale palette, echo off. Values are validated once at
//! load time; the rest of the program never re-checks them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Fixed operating rate used when the config does not override it.
pub const DEFAULT_TARGET_FPS: f32 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CamConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Optional palette preset file; the built-in presets apply when absent.
    #[serde(default)]
    pub presets: Option<PathBuf>,
    #[serde(default = "default_fps")]
    pub fps: f32,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub controls: Controls,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Expected dimensions of incoming video frames. The pipeline follows the
/// source if it renegotiates at runtime; this only seeds adapters that need
/// a size up front (the raw stdin reader, the synthetic pattern).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Output grid resolution. 128x112 matches the classic handheld camera
/// sensor this renderer imitates.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 112,
        }
    }
}

/// Initial render parameters; all of them stay adjustable at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Controls {
    #[serde(default)]
    pub brightness: f32,
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    #[serde(default = "default_dither")]
    pub dither: bool,
    #[serde(default)]
    pub echo: EchoSetting,
    #[serde(default = "default_echo_decay")]
    pub echo_decay: f32,
    /// Palette preset id; the library's first preset applies when absent.
    #[serde(default)]
    pub palette: Option<String>,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: default_contrast(),
            dither: default_dither(),
            echo: EchoSetting::default(),
            echo_decay: default_echo_decay(),
            palette: None,
        }
    }
}

/// Where the feedback trail composites relative to palette quantization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoSetting {
    #[default]
    Off,
    Before,
    After,
}

impl FromStr for EchoSetting {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(format!(
                "invalid echo mode '{other}'; expected 'off', 'before', or 'after'"
            )),
        }
    }
}

impl fmt::Display for EchoSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Integer nearest-neighbor upscale for still captures.
    #[serde(default = "default_still_scale")]
    pub still_scale: u32,
    /// Integer nearest-neighbor upscale for animated captures.
    #[serde(default = "default_gif_scale")]
    pub gif_scale: u32,
    /// Default recording length when the caller does not pass one.
    #[serde(
        default = "default_gif_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub gif_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            still_scale: default_still_scale(),
            gif_scale: default_gif_scale(),
            gif_duration: default_gif_duration(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_fps() -> f32 {
    DEFAULT_TARGET_FPS
}

fn default_contrast() -> f32 {
    1.0
}

fn default_dither() -> bool {
    true
}

fn default_echo_decay() -> f32 {
    0.85
}

fn default_still_scale() -> u32 {
    4
}

fn default_gif_scale() -> u32 {
    2
}

fn default_gif_duration() -> Duration {
    Duration::from_secs(5)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for CamConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            presets: None,
            fps: default_fps(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            controls: Controls::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl CamConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: CamConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fps must be positive and finite, got {}",
                self.fps
            )));
        }

        for (label, width, height) in [
            ("source", self.source.width, self.source.height),
            ("output", self.output.width, self.output.height),
        ] {
            if width == 0 || height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{label} resolution must be non-zero, got {width}x{height}"
                )));
            }
        }

        if !self.controls.contrast.is_finite() || !self.controls.brightness.is_finite() {
            return Err(ConfigError::Invalid(
                "brightness and contrast must be finite".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.controls.echo_decay) {
            return Err(ConfigError::Invalid(format!(
                "echo_decay must be within [0, 1], got {}",
                self.controls.echo_decay
            )));
        }

        for (label, scale) in [
            ("capture.still_scale", self.capture.still_scale),
            ("capture.gif_scale", self.capture.gif_scale),
        ] {
            if !(1..=16).contains(&scale) {
                return Err(ConfigError::Invalid(format!(
                    "{label} must be within 1..=16, got {scale}"
                )));
            }
        }

        if self.capture.gif_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "capture.gif_duration must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
fps = 10
presets = "presets.json"

[source]
width = 1280
height = 720

[output]
width = 128
height = 112

[controls]
brightness = 0.1
contrast = 1.2
dither = true
echo = "after"
echo_decay = 0.7
palette = "gameboy"

[capture]
still_scale = 4
gif_scale = 2
gif_duration = "3s"
"#;

    #[test]
    fn parses_sample_config() {
        let config = CamConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.fps, 10.0);
        assert_eq!(config.source.width, 1280);
        assert_eq!(config.controls.echo, EchoSetting::After);
        assert_eq!(config.controls.palette.as_deref(), Some("gameboy"));
        assert_eq!(config.capture.gif_duration, Duration::from_secs(3));
    }

    #[test]
    fn empty_input_yields_defaults() {
        let config = CamConfig::from_toml_str("").expect("defaults");
        assert_eq!(config.version, 1);
        assert_eq!(config.fps, DEFAULT_TARGET_FPS);
        assert_eq!(config.output.width, 128);
        assert_eq!(config.output.height, 112);
        assert_eq!(config.controls.echo, EchoSetting::Off);
        assert!(config.controls.dither);
        assert_eq!(config.capture.gif_duration, Duration::from_secs(5));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = CamConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_fps() {
        let err = CamConfig::from_toml_str("fps = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_decay() {
        let err = CamConfig::from_toml_str("[controls]\necho_decay = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_output_resolution() {
        let err = CamConfig::from_toml_str("[output]\nwidth = 0\nheight = 112").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn accepts_numeric_durations() {
        let config = CamConfig::from_toml_str("[capture]\ngif_duration = 2").unwrap();
        assert_eq!(config.capture.gif_duration, Duration::from_secs(2));
    }

    #[test]
    fn parses_echo_setting_strings() {
        assert_eq!("off".parse::<EchoSetting>().unwrap(), EchoSetting::Off);
        assert_eq!("Before".parse::<EchoSetting>().unwrap(), EchoSetting::Before);
        assert_eq!("after".parse::<EchoSetting>().unwrap(), EchoSetting::After);
        assert!("sideways".parse::<EchoSetting>().is_err());
    }
}
