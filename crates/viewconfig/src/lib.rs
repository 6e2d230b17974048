use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

const MIN_FIELD_OF_VIEW: f32 = 5.0;
const MAX_FIELD_OF_VIEW: f32 = 179.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    #[default]
    Gamma,
    Linear,
}

/// Top-level viewer configuration.
///
/// Every section is optional; a missing file or an empty one yields the
/// built-in defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub render: RenderSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSection {
    /// Initial field of view in degrees.
    pub field_of_view: f32,
    pub zoom_sensitivity: f32,
    pub pitch_sensitivity: f32,
    pub yaw_sensitivity: f32,
    pub roll_sensitivity: f32,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            field_of_view: 75.0,
            zoom_sensitivity: 5.0,
            pitch_sensitivity: 0.5,
            yaw_sensitivity: 0.5,
            roll_sensitivity: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "panoview".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderSection {
    /// RGBA in `[0, 1]`; accepts `"#rrggbb"`, `"#rrggbbaa"` or a 3/4-element array.
    #[serde(deserialize_with = "deserialize_color")]
    pub clear_color: [f64; 4],
    pub color_space: ColorSpace,
    pub vsync: bool,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            clear_color: [1.0, 1.0, 1.0, 1.0],
            color_space: ColorSpace::Gamma,
            vsync: true,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            camera: CameraSection::default(),
            window: WindowSection::default(),
            render: RenderSection::default(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn deserialize_color<'de, D>(deserializer: D) -> Result<[f64; 4], D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = [f64; 4];

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a \"#rrggbb\" colour or an array of 3 or 4 numbers in [0, 1]")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_hex_color(v).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut channels = Vec::with_capacity(4);
            while let Some(value) = seq.next_element::<f64>()? {
                channels.push(value);
            }
            match channels.as_slice() {
                [r, g, b] => Ok([*r, *g, *b, 1.0]),
                [r, g, b, a] => Ok([*r, *g, *b, *a]),
                other => Err(de::Error::invalid_length(other.len(), &self)),
            }
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn parse_hex_color(raw: &str) -> Result<[f64; 4], String> {
    let digits = raw.trim().trim_start_matches('#');
    if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
        return Err(format!("invalid colour '{raw}'; expected #rrggbb or #rrggbbaa"));
    }
    let mut channels = [1.0; 4];
    for (index, channel) in channels.iter_mut().enumerate().take(digits.len() / 2) {
        let pair = &digits[index * 2..index * 2 + 2];
        let value = u8::from_str_radix(pair, 16)
            .map_err(|err| format!("invalid colour '{raw}': {err}"))?;
        *channel = f64::from(value) / 255.0;
    }
    Ok(channels)
}

impl ViewerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewerConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let fov = self.camera.field_of_view;
        if !(MIN_FIELD_OF_VIEW..=MAX_FIELD_OF_VIEW).contains(&fov) {
            return Err(ConfigError::Invalid(format!(
                "camera.field_of_view {fov} must lie in [{MIN_FIELD_OF_VIEW}, {MAX_FIELD_OF_VIEW}]"
            )));
        }

        for (name, value) in [
            ("zoom_sensitivity", self.camera.zoom_sensitivity),
            ("pitch_sensitivity", self.camera.pitch_sensitivity),
            ("yaw_sensitivity", self.camera.yaw_sensitivity),
            ("roll_sensitivity", self.camera.roll_sensitivity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "camera.{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }

        if let Some(channel) = self
            .render
            .clear_color
            .iter()
            .find(|channel| !(0.0..=1.0).contains(*channel))
        {
            return Err(ConfigError::Invalid(format!(
                "render.clear_color channel {channel} is outside [0, 1]"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[camera]
field_of_view = 90
zoom_sensitivity = 2.5
yaw_sensitivity = 0.25

[window]
width = 1920
height = 1080
title = "lobby"

[render]
clear_color = "#000000"
color_space = "linear"
vsync = false
"##;

    #[test]
    fn parses_sample_config() {
        let config = ViewerConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.camera.field_of_view, 90.0);
        assert_eq!(config.camera.zoom_sensitivity, 2.5);
        // unspecified keys keep their defaults
        assert_eq!(config.camera.pitch_sensitivity, 0.5);
        assert_eq!(config.window.title, "lobby");
        assert_eq!(config.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.render.color_space, ColorSpace::Linear);
        assert!(!config.render.vsync);
    }

    #[test]
    fn empty_input_gives_defaults() {
        let config = ViewerConfig::from_toml_str("").expect("parse empty");
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.render.clear_color, [1.0; 4]);
    }

    #[test]
    fn clear_color_accepts_arrays() {
        let config = ViewerConfig::from_toml_str("[render]\nclear_color = [0.5, 0.25, 0]\n")
            .expect("parse array colour");
        assert_eq!(config.render.clear_color, [0.5, 0.25, 0.0, 1.0]);

        let err = ViewerConfig::from_toml_str("[render]\nclear_color = [0.5]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = ViewerConfig::from_toml_str("[camera]\nfield_of_view = 200\n").unwrap_err();
        assert!(err.to_string().contains("field_of_view"));

        let err = ViewerConfig::from_toml_str("[camera]\nroll_sensitivity = -1\n").unwrap_err();
        assert!(err.to_string().contains("roll_sensitivity"));

        let err = ViewerConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ViewerConfig::from_toml_str("[render]\nclear_color = [2, 0, 0]\n").unwrap_err();
        assert!(err.to_string().contains("clear_color"));
    }

    #[test]
    fn hex_colours_parse_alpha() {
        assert_eq!(parse_hex_color("#ff000080").unwrap()[3], 128.0 / 255.0);
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            ViewerConfig::load_or_default(Path::new("/definitely/not/here/panoview.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }
}
