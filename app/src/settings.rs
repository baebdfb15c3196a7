//! Settings persistence.
//!
//! The record is small and written on every change, synchronously, from the UI
//! thread. Both directions are best-effort: [`SettingsStore::load`] falls back
//! to defaults and [`SettingsStore::save`] logs and carries on.

use anyhow::{Context, Result};
use common::Settings;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "Loopwall";
const FILE_NAME: &str = "settings.json";

/// Reads and writes the settings file at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`SettingsStore::default_path`], or next to the working
    /// directory when the platform has no local data directory.
    pub fn at_default_location() -> Self {
        match Self::default_path() {
            Ok(path) => Self::new(path),
            Err(e) => {
                log::warn!("{:#}, keeping settings in the working directory", e);
                Self::new(FILE_NAME)
            }
        }
    }

    /// Per-user settings file, e.g. `%LOCALAPPDATA%\Loopwall\settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get local data directory")?
            .join(APP_DIR);

        Ok(data_dir.join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on any failure.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{:#}. Using default settings.", e);
                Settings::default()
            }
        }
    }

    /// Load settings; a missing file is not an error and yields defaults.
    pub fn try_load(&self) -> Result<Settings> {
        if !self.path.exists() {
            log::info!(
                "Settings file not found at {}, using defaults",
                self.path.display()
            );
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {}", self.path.display()))?;

        let settings = Settings::from_json(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", self.path.display()))?;

        log::info!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    /// Save settings, logging instead of failing.
    pub fn save(&self, settings: &Settings) {
        match self.try_save(settings) {
            Ok(()) => log::debug!("Saved settings to {}", self.path.display()),
            Err(e) => log::warn!("{:#}", e),
        }
    }

    /// Write the full record. The file is replaced atomically so a crash never
    /// leaves it half written.
    pub fn try_save(&self, settings: &Settings) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create settings directory: {}", dir.display()))?;

        let json = settings.to_json().context("Failed to serialize settings")?;

        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .context("Failed to write settings")?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to save settings file: {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AspectMode, PlaybackSpeed};

    fn sample() -> Settings {
        Settings {
            last_video_path: "C:\\Videos\\waves.mp4".to_string(),
            default_video_path: "C:\\Videos\\forest.mp4".to_string(),
            speed: PlaybackSpeed::OneAndHalf,
            aspect_mode: AspectMode::KeepAspect,
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        assert_eq!(store.try_load().unwrap(), Settings::default());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        store.save(&sample());
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));

        store.try_save(&sample()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = SettingsStore::new(&path);
        assert!(store.try_load().is_err());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_old_file_without_default_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "last_video": "/srv/clip.mp4", "speed": 0.5, "aspect_mode": "keep_aspect" }"#,
        )
        .unwrap();

        let settings = SettingsStore::new(&path).load();
        assert_eq!(settings.last_video_path, "/srv/clip.mp4");
        assert_eq!(settings.default_video_path, "");
        assert_eq!(settings.speed, PlaybackSpeed::Half);
        assert_eq!(settings.aspect_mode, AspectMode::KeepAspect);
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        store.save(&sample());
        let mut changed = sample();
        changed.speed = PlaybackSpeed::Double;
        store.save(&changed);

        assert_eq!(store.load().speed, PlaybackSpeed::Double);
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the final rename fail.
        let path = dir.path().join("settings.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let store = SettingsStore::new(&path);
        assert!(store.try_save(&sample()).is_err());
        store.save(&sample());
    }

    #[test]
    fn test_default_path_is_user_scoped() {
        if let Ok(path) = SettingsStore::default_path() {
            assert!(path.ends_with(Path::new(APP_DIR).join(FILE_NAME)));
        }
    }
}
