use crate::engine::EngineError;
use crate::hotkey::HotkeyError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by wallpaper operations.
///
/// Settings I/O failures are absent on purpose: the settings store recovers
/// from them itself (defaults on read, logged on write) and never returns them.
#[derive(Debug, Error)]
pub enum WallpaperError {
    #[error("video file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    InvalidValue(#[from] common::InvalidValue),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Hotkey(#[from] HotkeyError),
}

/// How an error reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disclosure {
    /// Modal error dialog plus status text.
    Dialog,
    /// Status text in the control panel.
    Status,
    /// Log only.
    Silent,
}

impl WallpaperError {
    pub fn disclosure(&self) -> Disclosure {
        match self {
            Self::NotFound(_) => Disclosure::Dialog,
            Self::InvalidValue(_) => Disclosure::Status,
            Self::Engine(_) | Self::Hotkey(_) => Disclosure::Silent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disclosure_policy() {
        assert_eq!(
            WallpaperError::NotFound(PathBuf::from("gone.mp4")).disclosure(),
            Disclosure::Dialog
        );
        assert_eq!(
            WallpaperError::from(common::InvalidValue::Speed(3.0)).disclosure(),
            Disclosure::Status
        );
        assert_eq!(
            WallpaperError::from(EngineError::NoMedia).disclosure(),
            Disclosure::Silent
        );
    }

    #[test]
    fn test_not_found_message_names_path() {
        let err = WallpaperError::NotFound(PathBuf::from("clips/rain.mp4"));
        assert!(err.to_string().contains("rain.mp4"));
    }
}
