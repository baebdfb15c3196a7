//! Common types for Loopwall.
//!
//! This crate defines the settings record that Loopwall persists between runs
//! and the two small value types it is built from, [`PlaybackSpeed`] and
//! [`AspectMode`].
//!
//! # Settings format
//!
//! Settings are stored as a flat JSON object:
//!
//! ```json
//! {
//!   "last_video": "C:\\Videos\\rain.mp4",
//!   "default_video": "",
//!   "speed": 1.0,
//!   "aspect_mode": "fit"
//! }
//! ```
//!
//! Older files may lack keys that newer versions added. [`Settings::from_json`]
//! fills every missing key from [`Settings::default`], so reading an old file
//! never fails just because it is old.
//!
//! # Examples
//!
//! ```
//! use common::{AspectMode, PlaybackSpeed, Settings};
//!
//! let settings = Settings::from_json(r#"{ "speed": 1.5 }"#).unwrap();
//! assert_eq!(settings.speed, PlaybackSpeed::OneAndHalf);
//! assert_eq!(settings.aspect_mode, AspectMode::Fit);
//! assert!(settings.default_video_path.is_empty());
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A value outside the set Loopwall supports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidValue {
    #[error("unsupported playback speed {0}x (expected 0.5, 1, 1.5 or 2)")]
    Speed(f64),

    #[error("unknown aspect mode '{0}' (expected 'fit' or 'keep_aspect')")]
    Aspect(String),
}

/// How the video is scaled onto the desktop surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Stretch to fill the surface exactly, ignoring the source aspect ratio.
    #[default]
    Fit,
    /// Constrain the picture to a 16:9 display ratio.
    KeepAspect,
}

impl AspectMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Self::Fit => Self::KeepAspect,
            Self::KeepAspect => Self::Fit,
        }
    }

    /// Identifier used in the settings file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::KeepAspect => "keep_aspect",
        }
    }

    /// Short label for buttons and status text.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fit => "Fit",
            Self::KeepAspect => "KeepAspect",
        }
    }

    /// Display ratio forced on the picture as `(numerator, denominator)`.
    ///
    /// `None` means the picture is stretched to the surface.
    pub fn forced_ratio(self) -> Option<(i32, i32)> {
        match self {
            Self::Fit => None,
            Self::KeepAspect => Some((16, 9)),
        }
    }
}

impl fmt::Display for AspectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectMode {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(Self::Fit),
            "keep_aspect" => Ok(Self::KeepAspect),
            other => Err(InvalidValue::Aspect(other.to_string())),
        }
    }
}

/// Playback rate, limited to the rates offered in the control panel.
///
/// Serialized as a plain number (`0.5`, `1.0`, `1.5`, `2.0`).
///
/// # Examples
///
/// ```
/// use common::PlaybackSpeed;
///
/// let speed = PlaybackSpeed::try_from(2.0).unwrap();
/// assert_eq!(speed, PlaybackSpeed::Double);
/// assert_eq!(speed.label(), "2x");
/// assert!(PlaybackSpeed::try_from(3.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackSpeed {
    Half,
    #[default]
    Normal,
    OneAndHalf,
    Double,
}

impl PlaybackSpeed {
    /// Every supported speed, slowest first. This is also the order of the
    /// speed selector in the control panel.
    pub const ALL: [PlaybackSpeed; 4] = [
        PlaybackSpeed::Half,
        PlaybackSpeed::Normal,
        PlaybackSpeed::OneAndHalf,
        PlaybackSpeed::Double,
    ];

    pub fn rate(self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::Normal => 1.0,
            Self::OneAndHalf => 1.5,
            Self::Double => 2.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Half => "0.5x",
            Self::Normal => "1x",
            Self::OneAndHalf => "1.5x",
            Self::Double => "2x",
        }
    }

    /// Position in [`PlaybackSpeed::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Half => 0,
            Self::Normal => 1,
            Self::OneAndHalf => 2,
            Self::Double => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl TryFrom<f64> for PlaybackSpeed {
    type Error = InvalidValue;

    fn try_from(rate: f64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|speed| (speed.rate() - rate).abs() < 1e-6)
            .ok_or(InvalidValue::Speed(rate))
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for PlaybackSpeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.rate())
    }
}

impl<'de> Deserialize<'de> for PlaybackSpeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rate = f64::deserialize(deserializer)?;
        Self::try_from(rate).map_err(serde::de::Error::custom)
    }
}

/// The persisted settings record.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Settings {
    /// Last video that loaded successfully. Empty when none.
    #[serde(rename = "last_video")]
    pub last_video_path: String,

    /// Video to start automatically. Empty when none.
    #[serde(rename = "default_video")]
    pub default_video_path: String,

    pub speed: PlaybackSpeed,

    pub aspect_mode: AspectMode,
}

impl Settings {
    /// Parse a settings document, taking defaults for missing keys.
    ///
    /// A document that is not a JSON object, or whose values have the wrong
    /// JSON type, is an error. A well-formed number that is not a supported
    /// speed, or an unknown aspect mode string, only resets that one field.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let document: SettingsDocument = serde_json::from_str(text)?;
        Ok(document.into())
    }

    /// Serialize with two-space indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// On-disk shape with every key optional.
#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    last_video: Option<String>,

    #[serde(default)]
    default_video: Option<String>,

    #[serde(default)]
    speed: Option<f64>,

    #[serde(default)]
    aspect_mode: Option<String>,
}

impl From<SettingsDocument> for Settings {
    fn from(value: SettingsDocument) -> Self {
        let defaults = Settings::default();

        let speed = match value.speed.map(PlaybackSpeed::try_from) {
            Some(Ok(speed)) => speed,
            Some(Err(e)) => {
                log::warn!("{}, using {}", e, defaults.speed);
                defaults.speed
            }
            None => defaults.speed,
        };

        let aspect_mode = match value.aspect_mode.as_deref().map(AspectMode::from_str) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                log::warn!("{}, using {}", e, defaults.aspect_mode);
                defaults.aspect_mode
            }
            None => defaults.aspect_mode,
        };

        Settings {
            last_video_path: value.last_video.unwrap_or(defaults.last_video_path),
            default_video_path: value.default_video.unwrap_or(defaults.default_video_path),
            speed,
            aspect_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.last_video_path, "");
        assert_eq!(settings.default_video_path, "");
        assert_eq!(settings.speed, PlaybackSpeed::Normal);
        assert_eq!(settings.aspect_mode, AspectMode::Fit);
    }

    #[test]
    fn test_default_settings_json_layout() {
        let json = Settings::default().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["last_video"], "");
        assert_eq!(value["default_video"], "");
        assert_eq!(value["speed"], 1.0);
        assert_eq!(value["aspect_mode"], "fit");
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_aspect_toggle_is_involution() {
        for mode in [AspectMode::Fit, AspectMode::KeepAspect] {
            assert_ne!(mode.toggled(), mode);
            assert_eq!(mode.toggled().toggled(), mode);
        }
    }

    #[test]
    fn test_aspect_parse() {
        assert_eq!("fit".parse::<AspectMode>(), Ok(AspectMode::Fit));
        assert_eq!(
            "keep_aspect".parse::<AspectMode>(),
            Ok(AspectMode::KeepAspect)
        );
        assert!("stretch".parse::<AspectMode>().is_err());
        assert_eq!(AspectMode::KeepAspect.forced_ratio(), Some((16, 9)));
        assert_eq!(AspectMode::Fit.forced_ratio(), None);
    }

    #[test]
    fn test_speed_lookup() {
        assert_eq!(PlaybackSpeed::try_from(0.5), Ok(PlaybackSpeed::Half));
        assert_eq!(PlaybackSpeed::try_from(1.0), Ok(PlaybackSpeed::Normal));
        assert_eq!(PlaybackSpeed::try_from(1.5), Ok(PlaybackSpeed::OneAndHalf));
        assert_eq!(PlaybackSpeed::try_from(2.0), Ok(PlaybackSpeed::Double));
        assert_eq!(
            PlaybackSpeed::try_from(0.75),
            Err(InvalidValue::Speed(0.75))
        );
        assert!(PlaybackSpeed::try_from(0.0).is_err());
        assert!(PlaybackSpeed::try_from(-1.0).is_err());
    }

    #[test]
    fn test_speed_index_matches_all() {
        for (i, speed) in PlaybackSpeed::ALL.into_iter().enumerate() {
            assert_eq!(speed.index(), i);
            assert_eq!(PlaybackSpeed::from_index(i), Some(speed));
        }
        assert_eq!(PlaybackSpeed::from_index(4), None);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let settings = Settings::from_json(
            r#"{ "last_video": "C:\\clips\\sea.mp4", "speed": 2.0, "aspect_mode": "keep_aspect" }"#,
        )
        .unwrap();

        assert_eq!(settings.last_video_path, "C:\\clips\\sea.mp4");
        assert_eq!(settings.default_video_path, "");
        assert_eq!(settings.speed, PlaybackSpeed::Double);
        assert_eq!(settings.aspect_mode, AspectMode::KeepAspect);
    }

    #[test]
    fn test_unknown_values_reset_single_field() {
        let settings = Settings::from_json(
            r#"{ "last_video": "a.mp4", "speed": 3.0, "aspect_mode": "zoom" }"#,
        )
        .unwrap();

        assert_eq!(settings.last_video_path, "a.mp4");
        assert_eq!(settings.speed, PlaybackSpeed::Normal);
        assert_eq!(settings.aspect_mode, AspectMode::Fit);
    }

    #[test]
    fn test_null_values_are_missing() {
        let settings = Settings::from_json(r#"{ "last_video": null, "speed": null }"#).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let settings =
            Settings::from_json(r#"{ "default_video": "b.mp4", "volume": 40 }"#).unwrap();
        assert_eq!(settings.default_video_path, "b.mp4");
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(Settings::from_json("").is_err());
        assert!(Settings::from_json("not json").is_err());
        assert!(Settings::from_json("[1, 2]").is_err());
        assert!(Settings::from_json(r#"{ "speed": "fast" }"#).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let settings = Settings {
            last_video_path: "/videos/last.mp4".to_string(),
            default_video_path: "/videos/default.mp4".to_string(),
            speed: PlaybackSpeed::Half,
            aspect_mode: AspectMode::KeepAspect,
        };

        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }
}
