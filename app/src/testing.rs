//! In-memory engine and window used by unit tests.
//!
//! Each fake hands out a monitor sharing its state, so a test can keep watching
//! (and poking) the fake after moving it into a surface.

use crate::engine::{EngineError, EngineResult, MediaEngine, MediaOptions, WindowHandle};
use crate::surface::{SurfaceWindow, WindowError};
use common::AspectMode;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Bind(WindowHandle),
    Open(PathBuf),
    Release,
    Play,
    Pause,
    Rate(f64),
    Aspect(AspectMode),
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<Call>,
    window: Option<WindowHandle>,
    media: Option<PathBuf>,
    options: Option<MediaOptions>,
    playing: bool,
    rate: f64,
    aspect: Option<AspectMode>,
    fail_open: bool,
    lose_media_on_failed_open: bool,
    polls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EngineMonitor(Rc<RefCell<EngineState>>);

impl EngineMonitor {
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    pub fn bound_window(&self) -> Option<WindowHandle> {
        self.0.borrow().window
    }

    pub fn last_options(&self) -> Option<MediaOptions> {
        self.0.borrow().options.clone()
    }

    pub fn has_media(&self) -> bool {
        self.0.borrow().media.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.0.borrow().rate
    }

    pub fn aspect(&self) -> Option<AspectMode> {
        self.0.borrow().aspect
    }

    pub fn polls(&self) -> usize {
        self.0.borrow().polls
    }

    /// Make `open` fail. The previous media stays loaded unless
    /// [`EngineMonitor::lose_media_on_failed_open`] is also set.
    pub fn fail_open(&self, fail: bool) {
        self.0.borrow_mut().fail_open = fail;
    }

    pub fn lose_media_on_failed_open(&self, lose: bool) {
        self.0.borrow_mut().lose_media_on_failed_open = lose;
    }

    /// Simulate the engine stopping on its own.
    pub fn set_playing(&self, playing: bool) {
        self.0.borrow_mut().playing = playing;
    }
}

/// Records every call. Like real pipelines it resets its rate to 1.0 when
/// playback starts.
#[derive(Debug)]
pub struct FakeEngine {
    state: EngineMonitor,
}

impl FakeEngine {
    pub fn new() -> (Self, EngineMonitor) {
        let monitor = EngineMonitor::default();
        monitor.0.borrow_mut().rate = 1.0;
        (
            Self {
                state: monitor.clone(),
            },
            monitor,
        )
    }

    fn record(&self, call: Call) {
        self.state.0.borrow_mut().calls.push(call);
    }
}

impl MediaEngine for FakeEngine {
    fn bind_window(&mut self, handle: WindowHandle) -> EngineResult<()> {
        self.record(Call::Bind(handle));
        self.state.0.borrow_mut().window = Some(handle);
        Ok(())
    }

    fn open(&mut self, path: &Path, options: &MediaOptions) -> EngineResult<()> {
        let mut state = self.state.0.borrow_mut();
        if state.fail_open {
            if state.lose_media_on_failed_open {
                state.media = None;
                state.playing = false;
            }
            return Err(EngineError::backend("open", "unsupported format"));
        }
        state.calls.push(Call::Open(path.to_path_buf()));
        state.media = Some(path.to_path_buf());
        state.options = Some(options.clone());
        state.playing = false;
        Ok(())
    }

    fn release(&mut self) -> EngineResult<()> {
        self.record(Call::Release);
        let mut state = self.state.0.borrow_mut();
        state.media = None;
        state.playing = false;
        Ok(())
    }

    fn play(&mut self) -> EngineResult<()> {
        self.record(Call::Play);
        let mut state = self.state.0.borrow_mut();
        if state.media.is_none() {
            return Err(EngineError::NoMedia);
        }
        state.playing = true;
        state.rate = 1.0;
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.record(Call::Pause);
        self.state.0.borrow_mut().playing = false;
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) -> EngineResult<()> {
        self.record(Call::Rate(rate));
        self.state.0.borrow_mut().rate = rate;
        Ok(())
    }

    fn set_aspect(&mut self, mode: AspectMode) -> EngineResult<()> {
        self.record(Call::Aspect(mode));
        self.state.0.borrow_mut().aspect = Some(mode);
        Ok(())
    }

    fn has_media(&self) -> bool {
        self.state.0.borrow().media.is_some()
    }

    fn is_playing(&self) -> bool {
        self.state.0.borrow().playing
    }

    fn poll(&mut self) {
        self.state.0.borrow_mut().polls += 1;
    }
}

#[derive(Debug, Default)]
struct WindowState {
    realized: bool,
    failing: bool,
    bottom_calls: usize,
    click_through_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WindowMonitor(Rc<RefCell<WindowState>>);

impl WindowMonitor {
    pub fn set_realized(&self, realized: bool) {
        self.0.borrow_mut().realized = realized;
    }

    pub fn set_failing(&self, failing: bool) {
        self.0.borrow_mut().failing = failing;
    }

    pub fn bottom_count(&self) -> usize {
        self.0.borrow().bottom_calls
    }

    pub fn click_through_count(&self) -> usize {
        self.0.borrow().click_through_calls
    }
}

#[derive(Debug)]
pub struct FakeWindow {
    state: WindowMonitor,
}

impl FakeWindow {
    pub const HANDLE: WindowHandle = WindowHandle(0xBEEF);

    pub fn shown() -> (Self, WindowMonitor) {
        let (window, monitor) = Self::hidden();
        monitor.set_realized(true);
        (window, monitor)
    }

    pub fn hidden() -> (Self, WindowMonitor) {
        let monitor = WindowMonitor::default();
        (
            Self {
                state: monitor.clone(),
            },
            monitor,
        )
    }

    fn check(&self) -> Result<(), WindowError> {
        if self.state.0.borrow().failing {
            return Err(WindowError("window is gone".to_string()));
        }
        Ok(())
    }
}

impl SurfaceWindow for FakeWindow {
    fn is_realized(&self) -> bool {
        self.state.0.borrow().realized
    }

    fn native_handle(&self) -> WindowHandle {
        Self::HANDLE
    }

    fn apply_click_through(&self) -> Result<(), WindowError> {
        self.state.0.borrow_mut().click_through_calls += 1;
        self.check()
    }

    fn send_to_bottom(&self) -> Result<(), WindowError> {
        self.state.0.borrow_mut().bottom_calls += 1;
        self.check()
    }
}

/// Create a non-empty file named `name` inside `dir`.
pub fn video_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();
    path
}
