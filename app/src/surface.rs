//! Background surface: the desktop window and the video playing in it.
//!
//! State machine:
//!
//! ```text
//!            load(path)                 play()
//!   Empty ─────────────► Loaded(Paused) ─────► Loaded(Playing)
//!     ▲                        ▲   ◄───────────────┘
//!     │         stop()         │       pause()
//!     └────────────────────────┴──────────────────────
//! ```
//!
//! Playing vs paused is never stored here. It is read back from the engine each
//! time, so it cannot drift from what is actually on screen.

use crate::engine::{EngineResult, MediaEngine, MediaOptions, WindowHandle};
use crate::error::WallpaperError;
use crate::log_and_continue;
use common::{AspectMode, PlaybackSpeed};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("window operation failed: {0}")]
pub struct WindowError(pub String);

/// The native window the video is drawn into.
pub trait SurfaceWindow {
    /// Whether the window is shown on screen. Engines cannot attach before that.
    fn is_realized(&self) -> bool;

    fn native_handle(&self) -> WindowHandle;

    /// Let mouse input fall through to the desktop and never take focus.
    fn apply_click_through(&self) -> Result<(), WindowError>;

    /// Move the window behind every other top-level window.
    fn send_to_bottom(&self) -> Result<(), WindowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Empty,
    Loaded(Playback),
}

/// Owns the playback engine and the window it renders into.
pub struct BackgroundSurface<E, W> {
    engine: E,
    window: W,
    current: Option<PathBuf>,
    speed: PlaybackSpeed,
    aspect: AspectMode,
    options: MediaOptions,
    bound: bool,
}

impl<E: MediaEngine, W: SurfaceWindow> BackgroundSurface<E, W> {
    pub fn new(engine: E, window: W, speed: PlaybackSpeed, aspect: AspectMode) -> Self {
        Self {
            engine,
            window,
            current: None,
            speed,
            aspect,
            options: MediaOptions::default(),
            bound: false,
        }
    }

    /// Attach the engine to the window.
    ///
    /// Does nothing until the window reports it is shown, and only binds once.
    /// Returns whether the engine is bound afterwards.
    pub fn realize(&mut self) -> bool {
        if self.bound {
            return true;
        }
        if !self.window.is_realized() {
            log::warn!("Desktop window is not shown yet, deferring engine binding");
            return false;
        }

        log_and_continue!(self.window.apply_click_through(), "make window click-through");
        log_and_continue!(self.window.send_to_bottom(), "send window to bottom");

        match self.engine.bind_window(self.window.native_handle()) {
            Ok(()) => {
                self.bound = true;
                log_and_continue!(self.apply_aspect(), "set aspect mode");
            }
            Err(e) => log::error!("Failed to bind video output to window: {}", e),
        }
        self.bound
    }

    /// Bind `path` to the engine, ready to play but not playing.
    ///
    /// The current rate and aspect mode are applied before returning. On error
    /// nothing changes, unless the engine lost the previous video while trying,
    /// in which case the surface is `Empty`.
    pub fn load(&mut self, path: &Path) -> Result<(), WallpaperError> {
        if !path.is_file() {
            return Err(WallpaperError::NotFound(path.to_path_buf()));
        }

        if let Err(e) = self.engine.open(path, &self.options) {
            if !self.engine.has_media()
                && let Some(previous) = self.current.take()
            {
                log::warn!("Previous video was unloaded: {}", previous.display());
            }
            return Err(e.into());
        }
        self.current = Some(path.to_path_buf());

        log_and_continue!(self.apply_rate(), "set playback rate");
        log_and_continue!(self.apply_aspect(), "set aspect mode");

        log::info!("Loaded video: {}", path.display());
        Ok(())
    }

    /// Start playback. No-op while empty.
    pub fn play(&mut self) {
        if self.current.is_none() {
            return;
        }
        log_and_continue!(self.engine.play(), "start playback");
        // The rate does not always survive a state change inside the engine.
        log_and_continue!(self.apply_rate(), "reapply playback rate");
    }

    /// Pause playback. No-op unless the engine reports it is playing.
    pub fn pause(&mut self) {
        if !self.engine.is_playing() {
            return;
        }
        log_and_continue!(self.engine.pause(), "pause playback");
    }

    /// Release the media and return to `Empty`.
    pub fn stop(&mut self) {
        log_and_continue!(self.engine.release(), "stop playback");
        if let Some(path) = self.current.take() {
            log::info!("Stopped video: {}", path.display());
        }
    }

    /// Validate and apply a playback rate.
    pub fn set_rate(&mut self, rate: f64) -> Result<PlaybackSpeed, WallpaperError> {
        let speed = PlaybackSpeed::try_from(rate)?;
        self.set_speed(speed);
        Ok(speed)
    }

    /// Apply a playback speed, whether playing or paused.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
        log_and_continue!(self.apply_rate(), "set playback rate");
    }

    /// Flip between Fit and KeepAspect and return the new mode.
    pub fn toggle_aspect(&mut self) -> AspectMode {
        self.aspect = self.aspect.toggled();
        log_and_continue!(self.apply_aspect(), "set aspect mode");
        log::info!("Aspect mode: {}", self.aspect);
        self.aspect
    }

    /// Periodic upkeep: keep the window at the bottom of the stack and
    /// click-through, and let the engine handle its events.
    ///
    /// Other applications and Explorer restarts can reorder windows or reset
    /// their styles; failures here are harmless and only logged at debug.
    pub fn maintain(&mut self) {
        if let Err(e) = self.window.send_to_bottom() {
            log::debug!("Keep-bottom failed: {}", e);
        }
        if let Err(e) = self.window.apply_click_through() {
            log::debug!("Click-through refresh failed: {}", e);
        }
        self.engine.poll();
    }

    pub fn state(&self) -> SurfaceState {
        match self.current {
            None => SurfaceState::Empty,
            Some(_) if self.engine.is_playing() => SurfaceState::Loaded(Playback::Playing),
            Some(_) => SurfaceState::Loaded(Playback::Paused),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Asks the engine; nothing is cached.
    pub fn is_playing(&self) -> bool {
        self.is_loaded() && self.engine.is_playing()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn aspect(&self) -> AspectMode {
        self.aspect
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    fn apply_rate(&mut self) -> EngineResult<()> {
        self.engine.set_rate(self.speed.rate())
    }

    fn apply_aspect(&mut self) -> EngineResult<()> {
        self.engine.set_aspect(self.aspect)
    }
}
