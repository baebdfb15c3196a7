//! User actions on top of the background surface.
//!
//! The controller is the single owner of application state: the surface, the
//! settings record and the store it is written to. Every action follows the same
//! shape: call the surface, persist the field that changed, update the status
//! line. Anything the user should notice beyond the status line is queued as a
//! [`Notice`] for the shell to show.

use crate::engine::MediaEngine;
use crate::error::{Disclosure, WallpaperError};
use crate::settings::SettingsStore;
use crate::surface::{BackgroundSurface, SurfaceState, SurfaceWindow};
use common::{AspectMode, PlaybackSpeed, Settings};
use std::path::{Path, PathBuf};

const IDLE: &str = "Idle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Tray balloon.
    Info,
    /// Modal error dialog.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub struct Controller<E, W> {
    surface: BackgroundSurface<E, W>,
    settings: Settings,
    store: SettingsStore,
    status: String,
    notices: Vec<Notice>,
}

impl<E: MediaEngine, W: SurfaceWindow> Controller<E, W> {
    /// Load settings from `store` and build the surface with the saved speed and
    /// aspect mode. Nothing is played until [`Controller::start`].
    pub fn new(engine: E, window: W, store: SettingsStore) -> Self {
        let settings = store.load();
        let surface =
            BackgroundSurface::new(engine, window, settings.speed, settings.aspect_mode);

        Self {
            surface,
            settings,
            store,
            status: IDLE.to_string(),
            notices: Vec::new(),
        }
    }

    /// Bind the engine to the desktop window. See [`BackgroundSurface::realize`].
    pub fn realize(&mut self) -> bool {
        self.surface.realize()
    }

    /// Start-up auto-load: the default video if it exists, otherwise the last
    /// one. Failures only end up in the status line.
    pub fn start(&mut self) {
        if let Some(path) = existing(&self.settings.default_video_path) {
            match self.load_and_play(&path) {
                Ok(()) => self.status = format!("Loaded default: {}", display_name(&path)),
                Err(e) => self.report_startup_failure(&e),
            }
            return;
        }

        if let Some(path) = existing(&self.settings.last_video_path) {
            match self.load_and_play(&path) {
                Ok(()) => self.status = format!("Loaded: {}", display_name(&path)),
                Err(e) => self.report_startup_failure(&e),
            }
            return;
        }

        log::info!("No video to restore, starting idle");
    }

    /// Load `path`, remember it as the last video and start playing.
    pub fn load_video(&mut self, path: &Path) {
        match self.surface.load(path) {
            Ok(()) => {
                self.settings.last_video_path = path.to_string_lossy().into_owned();
                self.store.save(&self.settings);
                self.surface.play();
                self.status = format!("Playing: {}", display_name(path));
            }
            Err(e) => {
                log::warn!("{}", e);
                self.status = format!("Failed to load video: {}", e);
                if e.disclosure() == Disclosure::Dialog {
                    self.notices.push(Notice::error(e.to_string()));
                }
            }
        }
    }

    /// Pause when playing, play otherwise. No-op without a video.
    pub fn toggle_playback(&mut self) {
        if !self.surface.is_loaded() {
            return;
        }
        if self.surface.is_playing() {
            self.surface.pause();
            self.status = "Paused".to_string();
        } else {
            self.surface.play();
            self.status = "Playing".to_string();
        }
    }

    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.surface.set_speed(speed);
        self.settings.speed = speed;
        self.store.save(&self.settings);
        self.status = format!("Speed: {}", speed.label());
    }

    /// Like [`Controller::set_speed`] for a raw rate; unsupported rates only
    /// change the status line.
    pub fn set_rate(&mut self, rate: f64) {
        match self.surface.set_rate(rate) {
            Ok(speed) => {
                self.settings.speed = speed;
                self.store.save(&self.settings);
                self.status = format!("Speed: {}", speed.label());
            }
            Err(e) => {
                log::warn!("{}", e);
                self.status = e.to_string();
            }
        }
    }

    pub fn toggle_aspect(&mut self) -> AspectMode {
        let mode = self.surface.toggle_aspect();
        self.settings.aspect_mode = mode;
        self.store.save(&self.settings);
        self.status = format!("Aspect: {}", mode.label());
        self.notices
            .push(Notice::info(format!("Aspect set to: {}", mode.as_str())));
        mode
    }

    /// Make the current video the one restored at start-up.
    pub fn set_as_default(&mut self) {
        let Some(path) = self.surface.current_path().map(Path::to_path_buf) else {
            return;
        };
        self.settings.default_video_path = path.to_string_lossy().into_owned();
        self.store.save(&self.settings);

        let name = display_name(&path);
        self.status = format!("Default set: {}", name);
        self.notices
            .push(Notice::info(format!("Default video set: {}", name)));
    }

    /// The control window went to the tray.
    pub fn hidden_to_tray(&mut self) {
        self.notices.push(Notice::info(
            "App minimized to tray. Use tray menu or Ctrl+R.",
        ));
    }

    /// Periodic tick, see [`BackgroundSurface::maintain`].
    pub fn maintain(&mut self) {
        self.surface.maintain();
    }

    /// Stop playback before exit.
    pub fn shutdown(&mut self) {
        self.surface.stop();
        log::info!("Playback stopped");
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn surface(&self) -> &BackgroundSurface<E, W> {
        &self.surface
    }

    pub fn state(&self) -> SurfaceState {
        self.surface.state()
    }

    pub fn has_media(&self) -> bool {
        self.surface.is_loaded()
    }

    pub fn can_set_default(&self) -> bool {
        self.has_media()
    }

    pub fn is_playing(&self) -> bool {
        self.surface.is_playing()
    }

    /// Caption for the play/pause button: the action a click would take.
    pub fn playback_label(&self) -> &'static str {
        if self.is_playing() { "Pause" } else { "Play" }
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.surface.speed()
    }

    pub fn aspect(&self) -> AspectMode {
        self.surface.aspect()
    }

    /// Notices queued since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn load_and_play(&mut self, path: &Path) -> Result<(), WallpaperError> {
        self.surface.load(path)?;
        self.surface.play();
        Ok(())
    }

    fn report_startup_failure(&mut self, error: &WallpaperError) {
        log::warn!("Could not restore video: {}", error);
        self.status = format!("Failed to load video: {}", error);
    }
}

/// Saved path, if set and still present on disk.
fn existing(saved: &str) -> Option<PathBuf> {
    if saved.is_empty() {
        return None;
    }
    let path = PathBuf::from(saved);
    if path.exists() {
        Some(path)
    } else {
        log::info!("Saved video no longer exists: {}", path.display());
        None
    }
}

/// File name for status text, falling back to the full path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
