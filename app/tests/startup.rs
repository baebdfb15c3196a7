/// Integration tests for start-up restore
/// These tests drive the controller through the public engine and window
/// traits, the way the Windows shell does
use common::{AspectMode, PlaybackSpeed, Settings};
use loopwall::controller::Controller;
use loopwall::engine::{EngineError, EngineResult, MediaEngine, MediaOptions, WindowHandle};
use loopwall::settings::SettingsStore;
use loopwall::surface::{Playback, SurfaceState, SurfaceWindow, WindowError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<String>,
    media: Option<PathBuf>,
    playing: bool,
}

#[derive(Clone, Default)]
struct RecordingEngine(Arc<Mutex<Recorded>>);

impl RecordingEngine {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().events.clone()
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().events.push(event);
    }
}

impl MediaEngine for RecordingEngine {
    fn bind_window(&mut self, handle: WindowHandle) -> EngineResult<()> {
        self.push(format!("bind {:#x}", handle.0));
        Ok(())
    }

    fn open(&mut self, path: &Path, options: &MediaOptions) -> EngineResult<()> {
        self.push(format!("open looping={}", options.looping));
        self.0.lock().unwrap().media = Some(path.to_path_buf());
        Ok(())
    }

    fn release(&mut self) -> EngineResult<()> {
        let mut recorded = self.0.lock().unwrap();
        recorded.media = None;
        recorded.playing = false;
        Ok(())
    }

    fn play(&mut self) -> EngineResult<()> {
        self.push("play".to_string());
        let mut recorded = self.0.lock().unwrap();
        if recorded.media.is_none() {
            return Err(EngineError::NoMedia);
        }
        recorded.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.0.lock().unwrap().playing = false;
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) -> EngineResult<()> {
        self.push(format!("rate {}", rate));
        Ok(())
    }

    fn set_aspect(&mut self, mode: AspectMode) -> EngineResult<()> {
        self.push(format!("aspect {}", mode));
        Ok(())
    }

    fn has_media(&self) -> bool {
        self.0.lock().unwrap().media.is_some()
    }

    fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }
}

struct ShownWindow;

impl SurfaceWindow for ShownWindow {
    fn is_realized(&self) -> bool {
        true
    }

    fn native_handle(&self) -> WindowHandle {
        WindowHandle(0x10)
    }

    fn apply_click_through(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn send_to_bottom(&self) -> Result<(), WindowError> {
        Ok(())
    }
}

fn controller_with(
    settings: Option<&Settings>,
    dir: &Path,
) -> (Controller<RecordingEngine, ShownWindow>, RecordingEngine) {
    let store = SettingsStore::new(dir.join("settings.json"));
    if let Some(settings) = settings {
        store.try_save(settings).unwrap();
    }
    let engine = RecordingEngine::default();
    let mut controller = Controller::new(engine.clone(), ShownWindow, store);
    assert!(controller.realize());
    (controller, engine)
}

#[test]
fn test_fresh_install_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, engine) = controller_with(None, dir.path());

    controller.start();

    assert_eq!(controller.settings(), &Settings::default());
    assert_eq!(controller.state(), SurfaceState::Empty);
    assert_eq!(controller.status(), "Idle");
    assert!(!engine.events().iter().any(|e| e.starts_with("open")));
}

#[test]
fn test_default_video_plays_with_saved_rate_and_aspect() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("ocean.mp4");
    std::fs::write(&video, b"not really a video").unwrap();

    let settings = Settings {
        default_video_path: video.to_string_lossy().into_owned(),
        speed: PlaybackSpeed::Half,
        aspect_mode: AspectMode::KeepAspect,
        ..Settings::default()
    };
    let (mut controller, engine) = controller_with(Some(&settings), dir.path());

    controller.start();

    assert_eq!(controller.status(), "Loaded default: ocean.mp4");
    assert_eq!(controller.state(), SurfaceState::Loaded(Playback::Playing));

    let events = engine.events();
    let open = events.iter().position(|e| e == "open looping=true").unwrap();
    let play = events.iter().position(|e| e == "play").unwrap();
    let before_play = &events[open..play];
    assert!(before_play.contains(&"rate 0.5".to_string()));
    assert!(before_play.contains(&"aspect keep_aspect".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("rate 0.5"));
}

#[test]
fn test_loaded_video_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("loop.webm");
    std::fs::write(&video, b"webm").unwrap();

    let (mut first, _) = controller_with(None, dir.path());
    first.load_video(&video);
    first.toggle_aspect();
    first.shutdown();
    drop(first);

    let (mut second, _) = controller_with(None, dir.path());
    second.start();

    assert_eq!(second.status(), "Loaded: loop.webm");
    assert_eq!(second.aspect(), AspectMode::KeepAspect);
    assert_eq!(second.surface().current_path(), Some(video.as_path()));
}
