//! Media engine seam for wallpaper video playback
//!
//! The background surface drives playback through the [`MediaEngine`] trait so the
//! state machine does not depend on a particular decode library:
//!
//! - `playbin`: GStreamer `playbin` backend rendering into a native window
//!   (Windows, `video` feature)
//! - [`NullEngine`]: stand-in used when no backend is compiled in or the backend
//!   failed to start
//!
//! Engines are driven from the UI thread only. Whatever threads the backend runs
//! internally are its own business.

#[cfg(all(windows, feature = "video"))]
mod playbin;

#[cfg(all(windows, feature = "video"))]
pub use self::playbin::GstEngine;

use common::AspectMode;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Caching window applied to every media load. Small enough to keep start-up
/// latency low.
pub const DEFAULT_CACHING: Duration = Duration::from_millis(300);

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media engine unavailable: {0}")]
    Unavailable(String),

    #[error("no media loaded")]
    NoMedia,

    #[error("{operation} failed: {reason}")]
    Backend {
        operation: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub fn backend(operation: &'static str, reason: impl ToString) -> Self {
        Self::Backend {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Native handle of the window the engine renders into (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub usize);

/// Options applied to each freshly opened media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    /// Restart from the beginning at end of stream, forever.
    pub looping: bool,

    /// How much media the engine buffers ahead before presenting.
    pub caching: Duration,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            looping: true,
            caching: DEFAULT_CACHING,
        }
    }
}

/// Playback engine bound to a single output window.
pub trait MediaEngine {
    /// Render into `handle`. Only valid once the window is shown.
    fn bind_window(&mut self, handle: WindowHandle) -> EngineResult<()>;

    /// Replace the current media with `path`, prepared but not playing.
    ///
    /// On error the previous media should stay loaded; [`MediaEngine::has_media`]
    /// reports whether it did.
    fn open(&mut self, path: &Path, options: &MediaOptions) -> EngineResult<()>;

    /// Stop playback and drop the current media.
    fn release(&mut self) -> EngineResult<()>;

    fn play(&mut self) -> EngineResult<()>;

    fn pause(&mut self) -> EngineResult<()>;

    /// Set the playback rate. Engines may forget it across play/stop cycles.
    fn set_rate(&mut self, rate: f64) -> EngineResult<()>;

    fn set_aspect(&mut self, mode: AspectMode) -> EngineResult<()>;

    fn has_media(&self) -> bool;

    /// Whether the engine itself reports active playback.
    fn is_playing(&self) -> bool;

    /// Handle pending engine events (end of stream, errors). Called periodically
    /// from the UI thread.
    fn poll(&mut self) {}
}

impl<E: MediaEngine + ?Sized> MediaEngine for Box<E> {
    fn bind_window(&mut self, handle: WindowHandle) -> EngineResult<()> {
        (**self).bind_window(handle)
    }

    fn open(&mut self, path: &Path, options: &MediaOptions) -> EngineResult<()> {
        (**self).open(path, options)
    }

    fn release(&mut self) -> EngineResult<()> {
        (**self).release()
    }

    fn play(&mut self) -> EngineResult<()> {
        (**self).play()
    }

    fn pause(&mut self) -> EngineResult<()> {
        (**self).pause()
    }

    fn set_rate(&mut self, rate: f64) -> EngineResult<()> {
        (**self).set_rate(rate)
    }

    fn set_aspect(&mut self, mode: AspectMode) -> EngineResult<()> {
        (**self).set_aspect(mode)
    }

    fn has_media(&self) -> bool {
        (**self).has_media()
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }

    fn poll(&mut self) {
        (**self).poll()
    }
}

/// Engine that cannot play anything.
///
/// Keeps the rest of the application usable (settings, tray, panel) when no
/// playback backend is available.
#[derive(Debug)]
pub struct NullEngine {
    reason: String,
}

impl NullEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable<T>(&self) -> EngineResult<T> {
        Err(EngineError::Unavailable(self.reason.clone()))
    }
}

impl MediaEngine for NullEngine {
    fn bind_window(&mut self, _handle: WindowHandle) -> EngineResult<()> {
        self.unavailable()
    }

    fn open(&mut self, _path: &Path, _options: &MediaOptions) -> EngineResult<()> {
        self.unavailable()
    }

    fn release(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn play(&mut self) -> EngineResult<()> {
        self.unavailable()
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.unavailable()
    }

    fn set_rate(&mut self, _rate: f64) -> EngineResult<()> {
        self.unavailable()
    }

    fn set_aspect(&mut self, _mode: AspectMode) -> EngineResult<()> {
        self.unavailable()
    }

    fn has_media(&self) -> bool {
        false
    }

    fn is_playing(&self) -> bool {
        false
    }
}

/// Create the best engine this build supports.
///
/// Never fails: if the backend cannot start, the error is logged and a
/// [`NullEngine`] is returned so the application keeps running.
#[cfg(all(windows, feature = "video"))]
pub fn create_engine() -> Box<dyn MediaEngine> {
    match GstEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            log::error!("Failed to initialize GStreamer playback: {}", e);
            Box::new(NullEngine::new(e.to_string()))
        }
    }
}

/// Create the best engine this build supports.
#[cfg(not(all(windows, feature = "video")))]
pub fn create_engine() -> Box<dyn MediaEngine> {
    log::warn!("Video support not compiled (build with --features video on Windows)");
    Box::new(NullEngine::new("video support not compiled in"))
}
