//! GStreamer playback backend
//!
//! A single `playbin` is reused for every video. Its video sink renders straight
//! into the desktop window through `VideoOverlay`, so no frames pass through the
//! application.
//!
//! - Hardware decoders (D3D11, NVDEC) are promoted above software decoders once,
//!   at initialization
//! - Looping re-queues the same URI on `about-to-finish`, which restarts without a
//!   gap; a seek back to zero on EOS covers streams where that signal is missed
//! - KeepAspect crops to 16:9 with `aspectratiocrop` and lets the sink letterbox;
//!   Fit disables both so the picture stretches over the window
//! - The playback rate lives in the running segment, which every loop restart
//!   and flushing seek replaces. A bus sync handler puts it back as soon as a
//!   new segment starts, without waiting for the UI tick

use super::{EngineError, EngineResult, MediaEngine, MediaOptions, WindowHandle};
use crate::log_and_continue;
use common::AspectMode;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Video sinks that implement `VideoOverlay` on Windows, most preferred first.
const VIDEO_SINKS: &[&str] = &["d3d11videosink", "d3dvideosink", "glimagesink"];

/// Hardware decoders promoted above the software fallbacks.
const HARDWARE_DECODERS: &[&str] = &[
    "d3d11h264dec",
    "d3d11h265dec",
    "d3d11vp9dec",
    "d3d11av1dec",
    "nvh264dec",
    "nvh265dec",
];

/// How long `open` waits for the first frame to be decoded.
const PREROLL_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(5);

/// Initialize GStreamer (idempotent, safe to call multiple times)
fn initialize_gstreamer() -> EngineResult<()> {
    static GSTREAMER_INITIALIZED: std::sync::OnceLock<Result<(), String>> =
        std::sync::OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized ({})", gst::version_string());
            prefer_hardware_decoders();
            Ok(())
        })
        .clone()
        .map_err(EngineError::Unavailable)
}

fn prefer_hardware_decoders() {
    let registry = gst::Registry::get();
    for name in HARDWARE_DECODERS {
        if let Some(feature) = registry.find_feature(name, gst::ElementFactory::static_type()) {
            feature.set_rank(gst::Rank::PRIMARY + 1);
            log::debug!("Preferring hardware decoder {}", name);
        }
    }
}

fn make_video_sink() -> EngineResult<gst::Element> {
    for name in VIDEO_SINKS {
        match gst::ElementFactory::make(name).name("wallpaper-sink").build() {
            Ok(sink) => {
                log::info!("Using video sink {}", name);
                return Ok(sink);
            }
            Err(_) => log::debug!("Video sink {} not available", name),
        }
    }

    Err(EngineError::Unavailable(format!(
        "none of the video sinks {:?} are installed",
        VIDEO_SINKS
    )))
}

/// Rate of the segment currently playing, if the pipeline can tell.
fn segment_rate(playbin: &gst::Element) -> Option<f64> {
    let mut query = gst::query::Segment::new(gst::Format::Time);
    playbin.query(&mut query).then(|| query.result().0)
}

/// A seek is only needed when the running segment has a different rate, or
/// when its rate is unknown.
fn needs_rate_seek(applied: Option<f64>, wanted: f64) -> bool {
    applied.is_none_or(|applied| (applied - wanted).abs() > f64::EPSILON)
}

/// Seek at the current position with `rate`, unless the segment already has it.
///
/// Before preroll there is nothing to seek; `AsyncDone` brings us back here.
fn sync_rate(playbin: &gst::Element, rate: f64) -> Result<(), gst::glib::BoolError> {
    let (_, current, _) = playbin.state(gst::ClockTime::ZERO);
    if current < gst::State::Paused || !needs_rate_seek(segment_rate(playbin), rate) {
        return Ok(());
    }

    let position = playbin
        .query_position::<gst::ClockTime>()
        .unwrap_or(gst::ClockTime::ZERO);

    log::debug!("Applying playback rate {} at {}", rate, position);
    playbin.seek(
        rate,
        gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
        gst::SeekType::Set,
        position,
        gst::SeekType::None,
        gst::ClockTime::NONE,
    )
}

fn read_rate(rate: &Mutex<f64>) -> f64 {
    rate.lock().map(|rate| *rate).unwrap_or(1.0)
}

/// GStreamer-backed [`MediaEngine`].
pub struct GstEngine {
    playbin: gst::Element,
    sink: gst::Element,
    crop: Option<gst::Element>,

    /// URI re-queued on `about-to-finish` while looping is on.
    loop_uri: Arc<Mutex<Option<String>>>,

    /// Rate requested by the surface. Shared with the bus sync handler, which
    /// reapplies it whenever a new segment starts.
    rate: Arc<Mutex<f64>>,

    /// URI of the media currently loaded.
    uri: Option<String>,
}

impl GstEngine {
    pub fn new() -> EngineResult<Self> {
        initialize_gstreamer()?;

        let playbin = gst::ElementFactory::make("playbin")
            .name("wallpaper-player")
            .build()
            .map_err(|e| EngineError::Unavailable(format!("playbin: {}", e)))?;

        let sink = make_video_sink()?;
        playbin.set_property("video-sink", &sink);

        let crop = match gst::ElementFactory::make("aspectratiocrop").build() {
            Ok(crop) => {
                playbin.set_property("video-filter", &crop);
                Some(crop)
            }
            Err(_) => {
                log::warn!("aspectratiocrop not available, KeepAspect will only letterbox");
                None
            }
        };

        let loop_uri: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let requeue = Arc::clone(&loop_uri);
        playbin.connect("about-to-finish", false, move |args| {
            let player = args[0].get::<gst::Element>().ok()?;
            if let Ok(uri) = requeue.lock()
                && let Some(uri) = uri.as_deref()
            {
                log::trace!("Re-queueing {} for seamless loop", uri);
                player.set_property("uri", uri);
            }
            None
        });

        let rate = Arc::new(Mutex::new(1.0));
        let bus = playbin
            .bus()
            .ok_or_else(|| EngineError::Unavailable("playbin has no bus".to_string()))?;
        let player = playbin.downgrade();
        let wanted = Arc::clone(&rate);
        bus.set_sync_handler(move |_, msg| {
            let new_segment = matches!(
                msg.view(),
                gst::MessageView::StreamStart(_) | gst::MessageView::AsyncDone(_)
            );
            if new_segment && let Some(player) = player.upgrade() {
                let wanted = Arc::clone(&wanted);
                // Streaming threads must not seek; GStreamer runs this on its own pool.
                player.call_async(move |player| {
                    if let Err(e) = sync_rate(player, read_rate(&wanted)) {
                        log::debug!("Could not reapply playback rate: {}", e);
                    }
                });
            }
            gst::BusSyncReply::Pass
        });

        Ok(Self {
            playbin,
            sink,
            crop,
            loop_uri,
            rate,
            uri: None,
        })
    }

    fn set_state(&self, state: gst::State, operation: &'static str) -> EngineResult<()> {
        self.playbin
            .set_state(state)
            .map(|_| ())
            .map_err(|e| EngineError::backend(operation, e))
    }

    fn set_loop_uri(&self, uri: Option<String>) {
        if let Ok(mut current) = self.loop_uri.lock() {
            *current = uri;
        }
    }

    fn apply_rate(&self) -> EngineResult<()> {
        sync_rate(&self.playbin, read_rate(&self.rate))
            .map_err(|e| EngineError::backend("set rate", e))
    }

    /// Swap `uri` in and wait until its first frame is decoded, so the rate is
    /// in place before anything is shown.
    fn prepare(&self, uri: &str, options: &MediaOptions) -> EngineResult<()> {
        self.set_state(gst::State::Null, "reset player")?;
        self.playbin.set_property("uri", uri);
        self.playbin
            .set_property("buffer-duration", options.caching.as_nanos() as i64);
        self.set_loop_uri(options.looping.then(|| uri.to_string()));

        self.set_state(gst::State::Paused, "open media")?;
        let (prerolled, _, _) = self.playbin.state(PREROLL_TIMEOUT);
        prerolled.map_err(|e| EngineError::backend("open media", e))?;

        self.apply_rate()
    }

    /// Drop whatever half-loaded media is left.
    fn clear(&mut self) {
        self.set_loop_uri(None);
        self.uri = None;
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::debug!("Failed to reset player: {}", e);
        }
    }

    /// Put back the media loaded before a failed `open`. It restarts from the
    /// beginning, playing if it was playing. If that fails too, no media is
    /// left loaded.
    fn restore(&mut self, previous: Option<(String, bool)>, options: &MediaOptions) {
        self.clear();
        let Some((uri, was_playing)) = previous else {
            return;
        };

        if let Err(e) = self.prepare(&uri, options) {
            log::warn!("Could not restore previous video {}: {}", uri, e);
            self.clear();
            return;
        }
        log::info!("Restored previous video: {}", uri);
        self.uri = Some(uri);
        if was_playing {
            log_and_continue!(self.set_state(gst::State::Playing, "play"), "resume playback");
        }
    }
}

impl MediaEngine for GstEngine {
    fn bind_window(&mut self, handle: WindowHandle) -> EngineResult<()> {
        let overlay = self
            .sink
            .dynamic_cast_ref::<gst_video::VideoOverlay>()
            .ok_or_else(|| EngineError::backend("bind window", "sink has no VideoOverlay"))?;

        // SAFETY: the handle belongs to the desktop window, which outlives the engine.
        unsafe { overlay.set_window_handle(handle.0) };
        overlay.expose();

        log::info!("Bound video output to window {:#x}", handle.0);
        Ok(())
    }

    fn open(&mut self, path: &Path, options: &MediaOptions) -> EngineResult<()> {
        let uri = gst::glib::filename_to_uri(path, None)
            .map_err(|e| EngineError::backend("open media", e))?
            .to_string();

        log::info!("Loading video: {}", path.display());

        let previous = self.uri.clone().map(|uri| (uri, self.is_playing()));
        match self.prepare(&uri, options) {
            Ok(()) => {
                self.uri = Some(uri);
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to open {}: {}", path.display(), e);
                self.restore(previous, options);
                Err(e)
            }
        }
    }

    fn release(&mut self) -> EngineResult<()> {
        self.set_loop_uri(None);
        self.uri = None;
        self.set_state(gst::State::Null, "stop")
    }

    fn play(&mut self) -> EngineResult<()> {
        if self.uri.is_none() {
            return Err(EngineError::NoMedia);
        }
        log::info!("Starting video playback");
        self.set_state(gst::State::Playing, "play")
    }

    fn pause(&mut self) -> EngineResult<()> {
        if self.uri.is_none() {
            return Err(EngineError::NoMedia);
        }
        log::info!("Pausing video playback");
        self.set_state(gst::State::Paused, "pause")
    }

    fn set_rate(&mut self, rate: f64) -> EngineResult<()> {
        if let Ok(mut wanted) = self.rate.lock() {
            *wanted = rate;
        }
        self.apply_rate()
    }

    fn set_aspect(&mut self, mode: AspectMode) -> EngineResult<()> {
        let (numer, denom) = mode.forced_ratio().unwrap_or((0, 1));

        if let Some(crop) = &self.crop {
            crop.set_property("aspect-ratio", gst::Fraction::new(numer, denom));
        }
        if self.sink.find_property("force-aspect-ratio").is_some() {
            self.sink
                .set_property("force-aspect-ratio", mode == AspectMode::KeepAspect);
        }

        if let Some(overlay) = self.sink.dynamic_cast_ref::<gst_video::VideoOverlay>() {
            overlay.expose();
        }
        Ok(())
    }

    fn has_media(&self) -> bool {
        self.uri.is_some()
    }

    fn is_playing(&self) -> bool {
        let (_, current, pending) = self.playbin.state(gst::ClockTime::ZERO);
        current == gst::State::Playing || pending == gst::State::Playing
    }

    fn poll(&mut self) {
        let Some(bus) = self.playbin.bus() else {
            return;
        };

        // Drain ALL messages from the bus so it never grows
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    let looping = self.loop_uri.lock().map(|u| u.is_some()).unwrap_or(false);
                    if looping {
                        // The sync handler restores the rate once the seek completes.
                        log::debug!("Video reached EOS, looping...");
                        let _ = self.playbin.seek_simple(
                            gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                            gst::ClockTime::ZERO,
                        );
                    }
                }

                gst::MessageView::Error(err) => {
                    log::error!(
                        "GStreamer error: {} (debug: {:?})",
                        err.error(),
                        err.debug()
                    );
                }

                _ => {}
            }
        }
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        self.set_loop_uri(None);
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::warn!("Failed to set player state to Null: {}", e);
        }

        // Drain pending messages from bus
        if let Some(bus) = self.playbin.bus() {
            bus.unset_sync_handler();
            let mut drained = 0;
            while bus.pop().is_some() {
                drained += 1;
            }
            if drained > 0 {
                log::debug!("Drained {} pending messages from bus", drained);
            }
        }

        log::info!("GstEngine::drop - player stopped, resources cleaned up");
    }
}
